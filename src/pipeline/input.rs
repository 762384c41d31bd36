//! Input resolution: normalise a user-supplied path or URL to a local file
//! and decide whether it is a PDF or a plain-text dump.
//!
//! pdfium requires a file-system path, so URLs are downloaded into a
//! `TempDir` that lives as long as the `ResolvedInput`. The format is sniffed
//! from the first bytes (`%PDF`) rather than the extension: uploads include
//! `.txt` dumps saved from PDF viewers with whatever name the browser picked.

use crate::error::ForgeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// What kind of content a resolved input holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pdf,
    Text,
}

/// The resolved input, either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, format: InputFormat },
    /// Input was a URL; the file lives in a temp directory kept alive here.
    Downloaded {
        path: PathBuf,
        format: InputFormat,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    pub fn format(&self) -> InputFormat {
        match self {
            ResolvedInput::Local { format, .. } => *format,
            ResolvedInput::Downloaded { format, .. } => *format,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Sniff the format from the leading bytes.
///
/// `%PDF` → PDF; anything else must be valid UTF-8 text.
pub fn sniff_format(path: &Path, bytes: &[u8]) -> Result<InputFormat, ForgeError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(InputFormat::Pdf);
    }
    match std::str::from_utf8(bytes) {
        Ok(_) => Ok(InputFormat::Text),
        // A multi-byte character cut at the end of the sniff window is fine.
        Err(e) if e.error_len().is_none() => Ok(InputFormat::Text),
        Err(e) => Err(ForgeError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: format!("neither a PDF nor UTF-8 text ({e})"),
        }),
    }
}

/// Resolve the input string to a local file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ForgeError> {
    if input.trim().is_empty() {
        return Err(ForgeError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and sniffing the format.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, ForgeError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(ForgeError::FileNotFound { path });
    }

    let format = match std::fs::File::open(&path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(1024);
            f.take(1024)
                .read_to_end(&mut head)
                .map_err(|e| ForgeError::Internal(format!("Failed to read {}: {e}", path.display())))?;
            sniff_format(&path, &head)?
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ForgeError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ForgeError::FileNotFound { path });
        }
    };

    debug!("Resolved local input: {} ({:?})", path.display(), format);
    Ok(ResolvedInput::Local { path, format })
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ForgeError> {
    info!("Downloading exam file from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ForgeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ForgeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ForgeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ForgeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);

    let temp_dir = TempDir::new().map_err(|e| ForgeError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ForgeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ForgeError::Internal(format!("Failed to write temp file: {}", e)))?;

    let head = &bytes[..bytes.len().min(1024)];
    let format = sniff_format(&file_path, head)?;

    info!("Downloaded to: {} ({:?})", file_path.display(), format);

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        format,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
