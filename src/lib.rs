//! # edgequake-img2json
//!
//! Extract structured JSON from scanned document images (invoices, receipts,
//! forms) using a vision-capable language model, or a local OCR pass
//! followed by a text model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image(s)
//!  │
//!  ├─ 1. Input     local file, directory or URL; sniffed as PNG / JPEG
//!  ├─ 2. Extract   vision:  image + schema → VLM (single-shot or streamed)
//!  │               ocr:     tesseract / oar-ocr → text → JSON-mode LLM
//!  ├─ 3. Sanitize  strip markdown fences, parse JSON (invalid → error record)
//!  └─ 4. Batch     tag every record with `source_file`, collect failures
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2json::{extract_batch, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / GROQ_API_KEY / ...
//!     let config = ExtractionConfig::builder().schema("invoice").build()?;
//!     let output = extract_batch(&["scans/".to_string()], &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.to_json_array())?);
//!     for failure in &output.failures {
//!         eprintln!("{failure}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `img2json` binary (clap + anyhow + indicatif) |
//! | `server` | on      | JSON HTTP API with per-session state (axum) |
//! | `oar`    | off     | oar-ocr ONNX text detector for the OCR backend |
//!
//! Library-only use:
//! ```toml
//! edgequake-img2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod schema;
pub mod session;
pub mod stream;

#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Backend, DetectorKind, ExtractionConfig, ExtractionConfigBuilder, OcrSettings};
pub use error::{ExtractError, FileError};
pub use extract::{
    artifact_file_name, batch_artifact_name, build_extractor, extract_batch, extract_batch_sync,
    extract_file, extract_inputs, run_batch, write_json_artifact, Extractor,
};
pub use output::{
    BatchEntry, BatchOutput, BatchStats, EntryRecord, ExtractedDocument, ExtractionResult,
    FileOutput,
};
pub use pipeline::input::InputFile;
pub use pipeline::ocr::{Detection, OcrExtractor, TextDetector, TextSpan};
pub use pipeline::sanitize::{clean, parse_model_output};
pub use pipeline::vision::VisionExtractor;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::SchemaCatalog;
pub use session::{ActiveView, SessionError, SessionState, SessionStore};
pub use stream::{drain_fragments, FragmentStream};
