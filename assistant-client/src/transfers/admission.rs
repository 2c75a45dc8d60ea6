//! Synchronous size/type checks applied before a file is queued.

use crate::config::TransferSettings;
use client_core::ClientError;
use std::path::Path;
use std::sync::Arc;

/// A file ready to be submitted. Content is shared so retries do not copy it.
#[derive(Debug, Clone)]
pub struct FileSubmission {
    pub filename: String,
    pub media_type: String,
    pub content: Arc<Vec<u8>>,
}

impl FileSubmission {
    pub fn new(filename: impl Into<String>, media_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            media_type: media_type.into(),
            content: Arc::new(content),
        }
    }

    /// Read a file from disk, inferring the media type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let media_type = media_type_for_path(path).ok_or_else(|| {
            ClientError::UnsupportedMediaType(format!(
                "cannot infer media type for {}",
                path.display()
            ))
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} is not a file path", path.display()),
                ))
            })?;
        let content = tokio::fs::read(path).await?;

        Ok(Self::new(filename, media_type, content))
    }

    pub fn byte_size(&self) -> u64 {
        self.content.len() as u64
    }
}

pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "xls" => Some("application/vnd.ms-excel"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    allowed_media_types: Vec<String>,
    max_bytes: u64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from(&TransferSettings::default())
    }
}

impl From<&TransferSettings> for AdmissionPolicy {
    fn from(settings: &TransferSettings) -> Self {
        Self::new(
            settings.allowed_media_types.clone(),
            settings.max_file_size_bytes,
        )
    }
}

impl AdmissionPolicy {
    pub fn new(allowed_media_types: Vec<String>, max_bytes: u64) -> Self {
        Self {
            allowed_media_types: allowed_media_types
                .into_iter()
                .map(|media_type| media_type.to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn check(&self, file: &FileSubmission) -> Result<(), ClientError> {
        let media_type = file.media_type.to_ascii_lowercase();
        if !self.allowed_media_types.contains(&media_type) {
            return Err(ClientError::UnsupportedMediaType(file.media_type.clone()));
        }

        let size = file.byte_size();
        if size > self.max_bytes {
            return Err(ClientError::FileTooLarge {
                size,
                max: self.max_bytes,
            });
        }

        Ok(())
    }
}
