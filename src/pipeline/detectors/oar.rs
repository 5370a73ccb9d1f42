//! oar-ocr detector: ONNX text detection + recognition, fully local.

use crate::config::OcrSettings;
use crate::error::ExtractError;
use crate::pipeline::ocr::{TextDetector, TextSpan};
use oar_ocr::oarocr::{OAROCRBuilder, OAROCR};
use std::path::PathBuf;
use tracing::info;

pub struct OarDetector {
    ocr: OAROCR,
}

impl OarDetector {
    /// Load the detection / recognition models and the character dictionary.
    pub fn from_settings(settings: &OcrSettings) -> Result<Self, ExtractError> {
        let det = required(&settings.det_model, "--oar-det-model")?;
        let rec = required(&settings.rec_model, "--oar-rec-model")?;
        let dict = required(&settings.dict_path, "--oar-dict")?;

        let ocr = OAROCRBuilder::new(&det, &rec, &dict)
            .build()
            .map_err(|e| ExtractError::DetectorUnavailable {
                detector: "oar".to_string(),
                detail: e.to_string(),
            })?;
        info!("Loaded oar-ocr models: {}", det.display());
        Ok(Self { ocr })
    }
}

fn required(path: &Option<PathBuf>, flag: &str) -> Result<PathBuf, ExtractError> {
    match path {
        Some(p) if p.exists() => Ok(p.clone()),
        Some(p) => Err(ExtractError::DetectorUnavailable {
            detector: "oar".to_string(),
            detail: format!("model file not found: {}", p.display()),
        }),
        None => Err(ExtractError::DetectorUnavailable {
            detector: "oar".to_string(),
            detail: format!("{flag} is required"),
        }),
    }
}

impl TextDetector for OarDetector {
    fn name(&self) -> &str {
        "oar"
    }

    fn detect(&self, image: &[u8]) -> Result<Vec<TextSpan>, String> {
        let img = image::load_from_memory(image)
            .map_err(|e| format!("decode: {e}"))?
            .to_rgb8();
        let result = self
            .ocr
            .predict(vec![img])
            .map_err(|e| e.to_string())?
            .into_iter()
            .next()
            .ok_or_else(|| "no result returned".to_string())?;

        Ok(result
            .text_regions
            .iter()
            .filter_map(|region| {
                let text = region.text.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                let points: Vec<(f32, f32)> = region
                    .bounding_box
                    .points
                    .iter()
                    .map(|p| (p.x, p.y))
                    .collect();
                Some(TextSpan {
                    text: text.to_string(),
                    confidence: region.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                    bbox: quad(&points),
                })
            })
            .collect())
    }
}

/// Four integer corners from a detection polygon.
///
/// A four-point polygon keeps its corners; anything else collapses to its
/// axis-aligned bounding rectangle.
fn quad(points: &[(f32, f32)]) -> [[i32; 2]; 4] {
    let r = |v: f32| v.round() as i32;
    if let [a, b, c, d] = points {
        return [[r(a.0), r(a.1)], [r(b.0), r(b.1)], [r(c.0), r(c.1)], [r(d.0), r(d.1)]];
    }
    let (mut x0, mut y0, mut x1, mut y1) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for &(x, y) in points {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    if points.is_empty() {
        return [[0, 0]; 4];
    }
    [[r(x0), r(y0)], [r(x1), r(y0)], [r(x1), r(y1)], [r(x0), r(y1)]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_keeps_four_corners() {
        let pts = [(1.4, 2.6), (10.0, 2.0), (10.0, 8.0), (1.0, 8.0)];
        assert_eq!(quad(&pts), [[1, 3], [10, 2], [10, 8], [1, 8]]);
    }

    #[test]
    fn quad_collapses_polygons() {
        let pts = [(0.0, 0.0), (5.0, 1.0), (6.0, 4.0), (2.0, 6.0), (0.0, 3.0)];
        assert_eq!(quad(&pts), [[0, 0], [6, 0], [6, 6], [0, 6]]);
        assert_eq!(quad(&[]), [[0, 0]; 4]);
    }

    #[test]
    fn missing_model_paths_are_reported() {
        let err = OarDetector::from_settings(&OcrSettings::default()).err().unwrap();
        assert!(err.to_string().contains("--oar-det-model"));
    }
}
