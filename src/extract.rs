//! Extraction entry points and the batch orchestrator.
//!
//! [`run_batch`] is the core loop: files are processed strictly in order,
//! one at a time, and every outcome lands somewhere. A parsed reply becomes
//! one tagged entry per document element, an unparseable reply becomes one
//! `invalid-json` entry, and an error becomes a [`FileError`] in
//! `failures`. One bad scan never aborts the batch.
//!
//! The wrappers around it ([`extract_batch`], [`extract_file`],
//! [`extract_inputs`]) resolve inputs, the schema and the extractor from an
//! [`ExtractionConfig`] and can fail only before the first file is touched.

use crate::config::{Backend, ExtractionConfig};
use crate::error::{ExtractError, FileError};
use crate::output::{BatchOutput, BatchStats, ExtractionResult, FileOutput};
use crate::pipeline::input::{self, file_stem, InputFile};
use crate::pipeline::ocr::OcrExtractor;
use crate::pipeline::sanitize::parse_model_output;
use crate::pipeline::vision::VisionExtractor;
use crate::progress::ProgressCallback;
use crate::provider::ensure_credentials;
use crate::schema::SchemaCatalog;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One extraction backend: image (+ optional schema) → model reply text.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn backend(&self) -> Backend;

    /// Short human-readable description for logs (`vision openai/gpt-4.1-nano`).
    fn describe(&self) -> String;

    /// The model's raw reply for one image.
    async fn extract(&self, image: &InputFile, schema: Option<&str>) -> Result<String, ExtractError>;

    /// [`Extractor::extract`] followed by sanitising and parsing.
    async fn extract_document(
        &self,
        image: &InputFile,
        schema: Option<&str>,
    ) -> Result<ExtractionResult, ExtractError> {
        let raw = self.extract(image, schema).await?;
        Ok(parse_model_output(&raw))
    }
}

/// Build the extractor selected by `config.backend`.
///
/// Checks credentials first, so a missing API key fails here rather than on
/// the first file.
pub fn build_extractor(config: &ExtractionConfig) -> Result<Box<dyn Extractor>, ExtractError> {
    ensure_credentials(config)?;
    let extractor: Box<dyn Extractor> = match config.backend {
        Backend::Vision => Box::new(VisionExtractor::from_config(config)?),
        Backend::Ocr => Box::new(OcrExtractor::from_config(config)?),
    };
    info!("Extractor: {}", extractor.describe());
    Ok(extractor)
}

/// Load the schema text named by `config.schema`, if any.
pub fn load_schema(config: &ExtractionConfig) -> Result<Option<String>, ExtractError> {
    match config.schema {
        Some(ref name) => {
            let catalog = SchemaCatalog::load(&config.schema_dir)?;
            let text = catalog.resolve(name)?;
            debug!("Schema '{}': {} bytes", name, text.len());
            Ok(Some(text))
        }
        None => Ok(None),
    }
}

/// Extract every input (paths, directories, URLs) as one batch.
///
/// # Errors
/// Only fatal setup errors: unreadable input, unknown schema, missing
/// credential. Per-file failures are reported in `output.failures`.
pub async fn extract_batch(
    inputs: &[String],
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let files = input::resolve_inputs(inputs, config.download_timeout_secs).await?;
    extract_inputs(&files, config).await
}

/// Extract already-loaded images as one batch.
pub async fn extract_inputs(
    files: &[InputFile],
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let schema = load_schema(config)?;
    let extractor = build_extractor(config)?;
    Ok(run_batch(
        files,
        extractor.as_ref(),
        schema.as_deref(),
        config.progress_callback.as_ref(),
    )
    .await)
}

/// Extract a single path or URL.
///
/// Unlike the batch functions, an upstream or detector failure is returned
/// as `Err`.
pub async fn extract_file(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<FileOutput, ExtractError> {
    let file = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let schema = load_schema(config)?;
    let extractor = build_extractor(config)?;

    let start = Instant::now();
    let result = extractor.extract_document(&file, schema.as_deref()).await?;
    Ok(FileOutput {
        source_file: file.filename,
        result,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Synchronous wrapper around [`extract_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_batch_sync(
    inputs: &[String],
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_batch(inputs, config))
}

/// Run `extractor` over `files` in order and merge the tagged results.
pub async fn run_batch(
    files: &[InputFile],
    extractor: &dyn Extractor,
    schema: Option<&str>,
    progress: Option<&ProgressCallback>,
) -> BatchOutput {
    let start = Instant::now();
    let total = files.len();
    info!("Starting batch: {} files ({})", total, extractor.backend());
    if let Some(cb) = progress {
        cb.on_batch_start(total);
    }

    let mut output = BatchOutput {
        stats: BatchStats {
            total_files: total,
            ..BatchStats::default()
        },
        ..BatchOutput::default()
    };

    for (i, file) in files.iter().enumerate() {
        let index = i + 1;
        if let Some(cb) = progress {
            cb.on_file_start(index, total, &file.filename);
        }

        let file_start = Instant::now();
        match extractor.extract_document(file, schema).await {
            Ok(result) => {
                if result.is_invalid() {
                    warn!("{}: reply is not valid JSON", file.filename);
                    output.stats.invalid_json_files += 1;
                } else {
                    output.stats.succeeded_files += 1;
                }
                output.documents.push(FileOutput {
                    source_file: file.filename.clone(),
                    result: result.clone(),
                    duration_ms: file_start.elapsed().as_millis() as u64,
                });
                let entries = result.into_entries(&file.filename);
                debug!("{}: {} entries", file.filename, entries.len());
                if let Some(cb) = progress {
                    cb.on_file_complete(index, total, &file.filename, entries.len());
                }
                output.entries.extend(entries);
            }
            Err(e) => {
                let failure = FileError::from_extract(&file.filename, &e);
                warn!("{}", failure);
                if let Some(cb) = progress {
                    cb.on_file_error(index, total, &file.filename, &failure.to_string());
                }
                output.stats.failed_files += 1;
                output.failures.push(failure);
            }
        }
    }

    output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    let produced = output.stats.succeeded_files + output.stats.invalid_json_files;
    info!(
        "Batch complete: {}/{} files, {} entries, {}ms",
        produced,
        total,
        output.entries.len(),
        output.stats.total_duration_ms
    );
    if let Some(cb) = progress {
        cb.on_batch_complete(total, produced);
    }
    output
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// Download name for a single file's result: `extract_<stem>.json`.
///
/// Quotes, slashes, backslashes and control characters in the stem become
/// `_`, so the name is safe inside a quoted header parameter and as a path
/// component.
pub fn artifact_file_name(source_file: &str) -> String {
    let name = Path::new(source_file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file.to_string());
    let stem: String = file_stem(&name)
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("extract_{stem}.json")
}

/// Download name for a batch: the single-file name for one file, else
/// `extract_batch_<n>_files.json`.
pub fn batch_artifact_name<S: AsRef<str>>(files: &[S]) -> String {
    match files {
        [only] => artifact_file_name(only.as_ref()),
        _ => format!("extract_batch_{}_files.json", files.len()),
    }
}

/// Pretty-printed UTF-8 JSON, as written to artifacts.
pub fn to_pretty_json(value: &Value) -> Result<String, ExtractError> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| ExtractError::Internal(format!("JSON serialisation: {e}")))?;
    text.push('\n');
    Ok(text)
}

/// Write `value` as pretty JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_json_artifact(path: impl AsRef<Path>, value: &Value) -> Result<(), ExtractError> {
    let path = path.as_ref();
    let text = to_pretty_json(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExtractError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, text.as_bytes())
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote {}", path.display());
    Ok(())
}
