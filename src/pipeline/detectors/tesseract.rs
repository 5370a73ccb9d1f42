//! Tesseract command-line detector.
//!
//! Runs `tesseract <image> stdout -l <langs> tsv` and keeps the word-level
//! rows. The TSV columns are:
//!
//! ```text
//! level page_num block_num par_num line_num word_num left top width height conf text
//! ```
//!
//! Level 5 is a word; `conf` is 0-100, or -1 for layout-only rows.

use crate::config::OcrSettings;
use crate::error::ExtractError;
use crate::pipeline::ocr::{TextDetector, TextSpan};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

const WORD_LEVEL: u32 = 5;

pub struct TesseractDetector {
    binary: PathBuf,
    languages: String,
}

impl TesseractDetector {
    pub fn new(binary: impl Into<PathBuf>, languages: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.into(),
        }
    }

    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self::new(settings.tesseract_binary.clone(), settings.languages.clone())
    }

    /// Check that the binary runs; returns its version line.
    pub fn probe(&self) -> Result<String, ExtractError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| ExtractError::DetectorUnavailable {
                detector: "tesseract".to_string(),
                detail: format!(
                    "cannot run '{}': {e}. Install tesseract-ocr or pass --tesseract-bin.",
                    self.binary.display()
                ),
            })?;
        // Older releases print the version on stderr.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or("tesseract").trim().to_string())
    }
}

impl TextDetector for TesseractDetector {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn detect(&self, image: &[u8]) -> Result<Vec<TextSpan>, String> {
        let mut file = tempfile::Builder::new()
            .prefix("img2json-")
            .suffix(".img")
            .tempfile()
            .map_err(|e| format!("temp file: {e}"))?;
        file.write_all(image)
            .map_err(|e| format!("temp file write: {e}"))?;

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("tsv")
            .output()
            .map_err(|e| format!("cannot run '{}': {e}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tsv(&tsv))
    }
}

/// Word spans from tesseract TSV output, in output order.
///
/// Header, non-word rows, rows with negative confidence or empty text, and
/// malformed rows are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<TextSpan> {
    tsv.lines()
        .filter(|line| !line.starts_with("level"))
        .filter_map(parse_row)
        .collect()
}

fn parse_row(line: &str) -> Option<TextSpan> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 11 {
        return None;
    }
    let level: u32 = cols[0].trim().parse().ok()?;
    if level != WORD_LEVEL {
        return None;
    }
    let conf: f32 = cols[10].trim().parse().ok()?;
    let text = cols.get(11).map(|t| t.trim()).unwrap_or("");
    if conf < 0.0 || text.is_empty() {
        return None;
    }
    let num = |i: usize| cols[i].trim().parse::<i32>().ok();
    let (left, top, width, height) = (num(6)?, num(7)?, num(8)?, num(9)?);

    let span = TextSpan::from_rect(text, conf / 100.0, left, top, width, height);
    debug!("tsv word '{}' conf {:.2}", span.text, span.confidence);
    Some(span)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
2\t1\t1\t0\t0\t0\t36\t92\t200\t40\t-1\t
4\t1\t1\t1\t1\t0\t36\t92\t200\t40\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t120\t40\t96.5\tINVOICE
5\t1\t1\t1\t1\t2\t170\t92\t66\t40\t91\tn°42
5\t1\t1\t1\t1\t3\t240\t92\t10\t40\t95\t
";

    #[test]
    fn keeps_word_rows_only() {
        let spans = parse_tsv(SAMPLE);
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["INVOICE", "n°42"]);
    }

    #[test]
    fn confidence_is_scaled_and_box_is_clockwise() {
        let spans = parse_tsv(SAMPLE);
        assert!((spans[0].confidence - 0.965).abs() < 1e-6);
        assert_eq!(spans[0].bbox, [[36, 92], [156, 92], [156, 132], [36, 132]]);
    }

    #[test]
    fn empty_and_malformed_input() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("5\tnot\tenough").is_empty());
        assert!(parse_tsv("5\t1\t1\t1\t1\t1\tx\t0\t1\t1\t90\tword").is_empty());
    }

    #[test]
    fn oversized_box_does_not_overflow() {
        let row = "5\t1\t1\t1\t1\t1\t2147483000\t10\t2147483000\t20\t90\tX";
        let spans = parse_tsv(row);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].bbox[1], [i32::MAX, 10]);
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let d = TesseractDetector::new("/nonexistent/tesseract-binary", "eng");
        assert!(matches!(
            d.probe(),
            Err(ExtractError::DetectorUnavailable { .. })
        ));
        let err = d.detect(b"not an image").unwrap_err();
        assert!(err.contains("cannot run"), "{err}");
    }
}
