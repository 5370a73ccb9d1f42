//! Error types for the edgequake-img2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal** for the operation that returned it: the
//!   input could not be read, no provider credential is configured, the
//!   schema directory is missing. Returned as `Err(ExtractError)` from the
//!   top-level `extract*` functions and from a single [`crate::Extractor`]
//!   call.
//!
//! * [`FileError`]: **Non-fatal**: one file of a batch failed (upstream
//!   error, detector failure) but every other file is fine. Stored in
//!   [`crate::output::BatchOutput::failures`] so a single bad scan never
//!   aborts the batch.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-img2json library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path, a directory or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a PNG or JPEG image.
    #[error("'{name}' is not a PNG or JPEG image (first bytes: {magic:?})")]
    NotAnImage { name: String, magic: Vec<u8> },

    /// An in-memory image was given an empty file name.
    #[error("Image has no file name; every input needs a non-empty name")]
    MissingFilename,

    /// A directory input contained no supported images.
    #[error("No PNG/JPEG images found in directory '{path}'")]
    EmptyDirectory { path: PathBuf },

    // ── Provider errors ───────────────────────────────────────────────────
    /// No API credential is available for the selected provider.
    #[error("No API key configured for provider '{provider}'.\n{hint}")]
    MissingCredential { provider: String, hint: String },

    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The hosted model call failed (network, auth, quota).
    #[error("Upstream model call failed: {message}")]
    Upstream { message: String },

    // ── Detector errors ───────────────────────────────────────────────────
    /// The local text detector is not installed or could not be loaded.
    #[error("Text detector '{detector}' is unavailable: {detail}")]
    DetectorUnavailable { detector: String, detail: String },

    /// The local text detector failed on an image.
    #[error("Text detector failed: {detail}")]
    Detector { detail: String },

    // ── Schema errors ─────────────────────────────────────────────────────
    /// The requested schema is neither a catalog entry nor a readable file.
    #[error("Schema '{name}' not found.\nAvailable schemas: {available}")]
    SchemaNotFound { name: String, available: String },

    /// The schema directory could not be listed.
    #[error("Failed to read schema directory '{path}': {source}")]
    SchemaDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single file of a batch.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileError {
    /// The hosted model call failed for this file.
    #[error("{file}: model call failed: {detail}")]
    Upstream { file: String, detail: String },

    /// The local text detector failed for this file.
    #[error("{file}: text detection failed: {detail}")]
    Detector { file: String, detail: String },

    /// Any other failure scoped to this file (unreadable input, internal).
    #[error("{file}: {detail}")]
    Other { file: String, detail: String },
}

impl FileError {
    /// Classify a fatal single-file error as a batch entry failure.
    pub fn from_extract(file: &str, err: &ExtractError) -> Self {
        let file = file.to_string();
        match err {
            ExtractError::Upstream { message } => FileError::Upstream {
                file,
                detail: message.clone(),
            },
            ExtractError::Detector { detail } => FileError::Detector {
                file,
                detail: detail.clone(),
            },
            other => FileError::Other {
                file,
                detail: other.to_string(),
            },
        }
    }

    /// Name of the file the error belongs to.
    pub fn file(&self) -> &str {
        match self {
            FileError::Upstream { file, .. }
            | FileError::Detector { file, .. }
            | FileError::Other { file, .. } => file,
        }
    }
}
