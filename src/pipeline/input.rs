//! Input resolution: turn user-supplied paths, directories and URLs into
//! in-memory images.
//!
//! Every image is read fully into memory and sniffed before any model call,
//! so a PDF or a truncated download fails here with a readable error instead
//! of as an opaque upstream 400.

use crate::error::ExtractError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One image ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Display name (file name for local inputs, last URL segment for
    /// downloads). Used as the `source_file` tag.
    pub filename: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl InputFile {
    /// Wrap in-memory bytes, rejecting anything that is not PNG or JPEG.
    ///
    /// The name becomes the `source_file` tag, so a blank one is refused.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let filename = filename.into();
        if filename.trim().is_empty() {
            return Err(ExtractError::MissingFilename);
        }
        let format = sniff_image(&filename, &bytes)?;
        Ok(Self {
            filename,
            bytes,
            format,
        })
    }

    /// File name without its extension (`scan.v2.png` → `scan.v2`).
    pub fn stem(&self) -> &str {
        file_stem(&self.filename)
    }

    /// MIME type of the sniffed format.
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Strip the last extension from a file name.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Check that `bytes` is a PNG or JPEG image.
pub fn sniff_image(name: &str, bytes: &[u8]) -> Result<ImageFormat, ExtractError> {
    match image::guess_format(bytes) {
        Ok(fmt @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(fmt),
        _ => Err(ExtractError::NotAnImage {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        }),
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve every input, preserving argument order.
///
/// A directory expands to the PNG/JPEG files directly inside it, sorted by
/// name. The first unreadable input aborts resolution.
pub async fn resolve_inputs(
    inputs: &[String],
    timeout_secs: u64,
) -> Result<Vec<InputFile>, ExtractError> {
    let mut files = Vec::new();
    for input in inputs {
        if is_url(input) {
            files.push(download_url(input, timeout_secs).await?);
            continue;
        }
        let path = PathBuf::from(input);
        if path.is_dir() {
            let listed = list_images(&path)?;
            if listed.is_empty() {
                return Err(ExtractError::EmptyDirectory { path });
            }
            for p in listed {
                files.push(read_local(&p).await?);
            }
        } else {
            files.push(read_local(&path).await?);
        }
    }
    Ok(files)
}

/// Resolve a single path or URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputFile, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.is_empty() {
        Err(ExtractError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        read_local(Path::new(input)).await
    }
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: dir.to_path_buf(),
        },
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

async fn read_local(path: &Path) -> Result<InputFile, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read local image: {} ({} bytes)", path.display(), bytes.len());
    InputFile::from_bytes(filename, bytes)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<InputFile, ExtractError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    InputFile::from_bytes(filename_from_url(url), bytes.to_vec())
}

/// Last non-empty path segment of a URL, or `downloaded.png`.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.png".to_string()
}
