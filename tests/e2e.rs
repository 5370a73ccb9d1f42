//! End-to-end integration tests for edgequake-img2json.
//!
//! The structural tests run everywhere: they drive the public API with
//! `MockProvider` and an in-process text detector, so no key or network is
//! needed.
//!
//! The live tests read scans from `./test_cases/` and call a hosted model.
//! They are gated behind the `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use edgequake_img2json::{
    batch_artifact_name, extract_batch, extract_file, extract_inputs, write_json_artifact,
    Backend, ExtractError, ExtractionConfig, ExtractionResult, FileError, InputFile,
    TextDetector, TextSpan,
};
use edgequake_llm::MockProvider;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn image_bytes(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([240, 240, 240])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

fn write_image(dir: &Path, name: &str, format: ImageFormat) -> String {
    let path = dir.join(name);
    std::fs::write(&path, image_bytes(format)).unwrap();
    path.to_string_lossy().into_owned()
}

async fn mock_with(replies: &[&str]) -> Arc<MockProvider> {
    let mock = MockProvider::new();
    for r in replies {
        mock.add_response(*r).await;
    }
    Arc::new(mock)
}

/// Detector that returns fixed spans without looking at the image.
struct ReceiptDetector;

impl TextDetector for ReceiptDetector {
    fn name(&self) -> &str {
        "receipt"
    }

    fn detect(&self, _image: &[u8]) -> Result<Vec<TextSpan>, String> {
        Ok(vec![
            TextSpan::from_rect("TOTAL", 0.98, 10, 10, 50, 12),
            TextSpan::from_rect("12.50", 0.95, 70, 10, 40, 12),
        ])
    }
}

struct BrokenDetector;

impl TextDetector for BrokenDetector {
    fn name(&self) -> &str {
        "broken"
    }

    fn detect(&self, _image: &[u8]) -> Result<Vec<TextSpan>, String> {
        Err("model file missing".into())
    }
}

/// Skip this test if E2E_ENABLED is not set or no scan exists at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

// ── Structural tests (always on) ─────────────────────────────────────────────

#[tokio::test]
async fn directory_batch_is_tagged_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "b.jpg", ImageFormat::Jpeg);
    write_image(dir.path(), "a.png", ImageFormat::Png);
    std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

    let provider = mock_with(&[
        r#"{"vendor": "ACME"}"#,
        "```json\n[{\"line\": 1}, {\"line\": 2}]\n```",
    ])
    .await;
    let config = ExtractionConfig::builder()
        .provider(provider)
        .build()
        .unwrap();

    let inputs = vec![dir.path().to_string_lossy().into_owned()];
    let output = extract_batch(&inputs, &config).await.unwrap();

    assert_eq!(
        output.to_json_array(),
        json!([
            {"vendor": "ACME", "source_file": "a.png"},
            {"line": 1, "source_file": "b.jpg"},
            {"line": 2, "source_file": "b.jpg"},
        ])
    );
    assert!(output.failures.is_empty());
    assert_eq!(output.stats.total_files, 2);
    assert_eq!(output.stats.succeeded_files, 2);
}

#[tokio::test]
async fn unparseable_reply_becomes_error_entry() {
    let provider = mock_with(&["I could not read this document."]).await;
    let config = ExtractionConfig::builder()
        .provider(provider)
        .build()
        .unwrap();

    let file = InputFile::from_bytes("blurry.png", image_bytes(ImageFormat::Png)).unwrap();
    let output = extract_inputs(&[file], &config).await.unwrap();

    assert_eq!(output.entries.len(), 1);
    let entry = output.entries[0].to_value();
    assert_eq!(entry["source_file"], "blurry.png");
    assert_eq!(entry["raw"], "I could not read this document.");
    assert_eq!(output.stats.invalid_json_files, 1);
}

#[tokio::test]
async fn catalog_schema_is_sent_to_the_model() {
    let schemas = tempfile::tempdir().unwrap();
    std::fs::write(
        schemas.path().join("receipt.json"),
        r#"{"total": "number"}"#,
    )
    .unwrap();
    let images = tempfile::tempdir().unwrap();
    let path = write_image(images.path(), "r.png", ImageFormat::Png);

    let provider = mock_with(&[r#"{"total": 12.5}"#]).await;
    let config = ExtractionConfig::builder()
        .provider(provider)
        .schema_dir(schemas.path())
        .schema("receipt")
        .build()
        .unwrap();

    let out = extract_file(&path, &config).await.unwrap();
    assert_eq!(out.source_file, "r.png");
    assert_eq!(out.result.to_value(), json!({"total": 12.5}));
}

#[tokio::test]
async fn unknown_schema_fails_before_any_file() {
    let schemas = tempfile::tempdir().unwrap();
    let provider = mock_with(&[]).await;
    let config = ExtractionConfig::builder()
        .provider(provider)
        .schema_dir(schemas.path())
        .schema("passport")
        .build()
        .unwrap();

    let file = InputFile::from_bytes("p.png", image_bytes(ImageFormat::Png)).unwrap();
    let err = extract_inputs(&[file], &config).await.unwrap_err();
    assert!(matches!(err, ExtractError::SchemaNotFound { .. }), "{err:?}");
}

#[test]
fn nameless_image_is_rejected() {
    let err = InputFile::from_bytes(" ", image_bytes(ImageFormat::Png)).unwrap_err();
    assert!(matches!(err, ExtractError::MissingFilename), "{err:?}");
}

#[tokio::test]
async fn non_image_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.pdf");
    std::fs::write(&path, b"%PDF-1.7\n").unwrap();

    let config = ExtractionConfig::builder()
        .provider(mock_with(&[]).await)
        .build()
        .unwrap();
    let err = extract_batch(&[path.to_string_lossy().into_owned()], &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::NotAnImage { .. }), "{err:?}");
}

#[tokio::test]
async fn ocr_backend_structures_detected_text() {
    let provider = mock_with(&[r#"{"total": "12.50"}"#]).await;
    let config = ExtractionConfig::builder()
        .backend(Backend::Ocr)
        .provider(provider)
        .detector(Arc::new(ReceiptDetector))
        .build()
        .unwrap();

    let file = InputFile::from_bytes("receipt.jpg", image_bytes(ImageFormat::Jpeg)).unwrap();
    let output = extract_inputs(&[file], &config).await.unwrap();
    assert_eq!(
        output.to_json_array(),
        json!([{"total": "12.50", "source_file": "receipt.jpg"}])
    );
}

#[tokio::test]
async fn detector_failure_is_isolated_to_its_file() {
    let config = ExtractionConfig::builder()
        .backend(Backend::Ocr)
        .provider(mock_with(&[]).await)
        .detector(Arc::new(BrokenDetector))
        .build()
        .unwrap();

    let files = vec![
        InputFile::from_bytes("a.png", image_bytes(ImageFormat::Png)).unwrap(),
        InputFile::from_bytes("b.png", image_bytes(ImageFormat::Png)).unwrap(),
    ];
    let output = extract_inputs(&files, &config).await.unwrap();
    assert!(output.entries.is_empty());
    assert_eq!(output.failures.len(), 2);
    assert!(matches!(output.failures[0], FileError::Detector { .. }));
    assert_eq!(output.failures[1].file(), "b.png");
}

#[tokio::test]
async fn artifact_round_trips_through_disk() {
    let provider = mock_with(&[r#"{"id": 7}"#]).await;
    let config = ExtractionConfig::builder()
        .provider(provider)
        .build()
        .unwrap();
    let file = InputFile::from_bytes("form.png", image_bytes(ImageFormat::Png)).unwrap();
    let output = extract_inputs(&[file], &config).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(batch_artifact_name(&["form.png"]));
    write_json_artifact(&path, &output.to_download_value())
        .await
        .unwrap();

    assert!(path.ends_with("extract_form.json"));
    let text = std::fs::read_to_string(&path).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value, json!({"id": 7}));
    assert_eq!(output.to_json_array(), json!([{"id": 7, "source_file": "form.png"}]));
}

// ── Live tests (E2E_ENABLED) ─────────────────────────────────────────────────

#[tokio::test]
async fn test_live_vision_extraction() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.png"));
    let config = ExtractionConfig::default();

    let out = extract_file(path.to_string_lossy(), &config)
        .await
        .expect("live extraction failed");
    println!("{}", serde_json::to_string_pretty(&out.result.to_value()).unwrap());
    assert!(
        !matches!(out.result, ExtractionResult::InvalidJson { .. }),
        "model reply did not parse"
    );
}

#[tokio::test]
async fn test_live_streaming_extraction() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.png"));
    let config = ExtractionConfig::builder().stream(true).build().unwrap();

    let out = extract_file(path.to_string_lossy(), &config)
        .await
        .expect("live streaming extraction failed");
    assert!(!out.result.is_invalid(), "streamed reply did not parse");
}

#[tokio::test]
async fn test_live_ocr_extraction() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt.jpg"));
    let config = ExtractionConfig::builder()
        .backend(Backend::Ocr)
        .build()
        .unwrap();

    match extract_file(path.to_string_lossy(), &config).await {
        Ok(out) => println!("{}", serde_json::to_string_pretty(&out.result.to_value()).unwrap()),
        Err(ExtractError::DetectorUnavailable { detail, .. }) => {
            println!("SKIP — {detail}");
        }
        Err(e) => panic!("live OCR extraction failed: {e}"),
    }
}
