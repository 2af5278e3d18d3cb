//! Candidate file validation and preview generation.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use shared::domain::UploadedFile;
use thiserror::Error;
use tracing::{debug, warn};

/// 16 MiB, the same cap the inference server applies to uploads.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported type: '{media_type}' is not an image")]
    UnsupportedType { media_type: String },
    #[error("'{file_name}' is {size_bytes} bytes; the limit is {limit_bytes}")]
    TooLarge {
        file_name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },
    #[error("failed to read '{file_name}': {reason}")]
    Unreadable { file_name: String, reason: String },
}

#[derive(Debug, Clone)]
pub enum FileSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// A file offered by drag-drop or a picker, not yet validated.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub file_name: String,
    pub media_type: String,
    pub source: FileSource,
}

impl CandidateFile {
    pub fn from_bytes(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            source: FileSource::Bytes(bytes),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>, media_type: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            file_name: display_name(&path),
            media_type: media_type.into(),
            source: FileSource::Path(path),
        }
    }

    /// Declares the media type from the file extension, the way a browser
    /// file picker would.
    pub fn from_path_guessing_type(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let media_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self::from_path(path, media_type)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Lowercased media type with parameters stripped (`image/PNG; q=1` -> `image/png`).
pub fn media_type_essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_image_media_type(media_type: &str) -> bool {
    media_type_essence(media_type)
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

#[derive(Debug, Clone)]
pub struct FileIngestionValidator {
    max_upload_bytes: u64,
}

impl Default for FileIngestionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl FileIngestionValidator {
    pub fn new(max_upload_bytes: u64) -> Self {
        Self { max_upload_bytes }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Checks the declared type before touching the content, then reads the
    /// content and builds a `data:` URI preview. Mutates nothing.
    pub async fn validate(&self, candidate: CandidateFile) -> Result<UploadedFile, ValidationError> {
        let CandidateFile {
            file_name,
            media_type,
            source,
        } = candidate;

        if !is_image_media_type(&media_type) {
            warn!(file = %file_name, %media_type, "rejected non-image upload");
            return Err(ValidationError::UnsupportedType { media_type });
        }
        let media_type = media_type_essence(&media_type);

        let bytes = match source {
            FileSource::Bytes(bytes) => {
                self.check_size(&file_name, bytes.len() as u64)?;
                bytes
            }
            FileSource::Path(path) => {
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| unreadable(&file_name, e))?;
                self.check_size(&file_name, metadata.len())?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| unreadable(&file_name, e))?;
                self.check_size(&file_name, bytes.len() as u64)?;
                bytes
            }
        };

        let preview_data_uri = format!("data:{media_type};base64,{}", STANDARD.encode(&bytes));
        debug!(file = %file_name, %media_type, size_bytes = bytes.len(), "accepted upload");
        Ok(UploadedFile {
            file_name,
            media_type,
            bytes,
            preview_data_uri,
            uploaded_at: Utc::now(),
        })
    }

    fn check_size(&self, file_name: &str, size_bytes: u64) -> Result<(), ValidationError> {
        if size_bytes > self.max_upload_bytes {
            warn!(file = %file_name, size_bytes, limit = self.max_upload_bytes, "rejected oversized upload");
            return Err(ValidationError::TooLarge {
                file_name: file_name.to_string(),
                size_bytes,
                limit_bytes: self.max_upload_bytes,
            });
        }
        Ok(())
    }
}

fn unreadable(file_name: &str, err: std::io::Error) -> ValidationError {
    ValidationError::Unreadable {
        file_name: file_name.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/ingest_tests.rs"]
mod tests;
