//! Image encoding: raw PNG/JPEG bytes → base64 `ImageData`.
//!
//! The uploaded bytes are sent as-is; re-encoding a phone-camera JPEG to PNG
//! would only inflate the request. `detail: "high"` keeps fine print legible
//! for models that tile images.

use crate::pipeline::input::InputFile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap an input image for a multimodal chat message.
pub fn encode_image(file: &InputFile) -> ImageData {
    let b64 = STANDARD.encode(&file.bytes);
    debug!("Encoded {} → {} bytes base64", file.filename, b64.len());
    ImageData::new(b64, file.mime_type()).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::fixtures;

    #[test]
    fn encode_keeps_original_bytes_and_mime() {
        let bytes = fixtures::png();
        let file = InputFile::from_bytes("a.png", bytes.clone()).unwrap();
        let data = encode_image(&file);
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), bytes);
        assert!(data.to_data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn jpeg_gets_jpeg_mime() {
        let file =
            InputFile::from_bytes("a.jpg", fixtures::image_bytes(image::ImageFormat::Jpeg)).unwrap();
        assert_eq!(encode_image(&file).mime_type, "image/jpeg");
    }
}
