//! Local text detectors for the OCR backend.
//!
//! [`tesseract`] shells out to the `tesseract` program and is always
//! available. `oar` runs ONNX models in-process and is compiled only with the
//! `oar` feature.

#[cfg(feature = "oar")]
pub mod oar;
pub mod tesseract;

use crate::config::{DetectorKind, OcrSettings};
use crate::error::ExtractError;
use crate::pipeline::ocr::TextDetector;
use std::sync::Arc;
use tracing::info;

/// Construct and check the configured detector.
pub fn build_detector(settings: &OcrSettings) -> Result<Arc<dyn TextDetector>, ExtractError> {
    match settings.detector {
        DetectorKind::Tesseract => {
            let detector = tesseract::TesseractDetector::from_settings(settings);
            let version = detector.probe()?;
            info!("Using {} (languages: {})", version, settings.languages);
            Ok(Arc::new(detector))
        }
        #[cfg(feature = "oar")]
        DetectorKind::Oar => Ok(Arc::new(oar::OarDetector::from_settings(settings)?)),
        #[cfg(not(feature = "oar"))]
        DetectorKind::Oar => Err(ExtractError::DetectorUnavailable {
            detector: "oar".to_string(),
            detail: "this build does not include the `oar` feature".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unavailable_tesseract_fails_fast() {
        let settings = OcrSettings {
            tesseract_binary: PathBuf::from("/nonexistent/tesseract"),
            ..OcrSettings::default()
        };
        assert!(matches!(
            build_detector(&settings),
            Err(ExtractError::DetectorUnavailable { .. })
        ));
    }

    #[cfg(not(feature = "oar"))]
    #[test]
    fn oar_needs_feature() {
        let settings = OcrSettings {
            detector: DetectorKind::Oar,
            ..OcrSettings::default()
        };
        let err = build_detector(&settings).err().unwrap();
        assert!(err.to_string().contains("oar"));
    }
}
