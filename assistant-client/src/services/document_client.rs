//! REST collaborator for file upload, listing, status, tags and deletion.

use crate::auth::Credential;
use crate::config::ApiSettings;
use crate::dtos::{FileResponse, FileStatusResponse, TagsResponse};
use crate::transfers::FileSubmission;
use async_trait::async_trait;
use client_core::observability::TracedClientExt;
use client_core::ClientError;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::sync::Arc;
use std::time::Duration;

use super::ensure_success;

/// Called with `(bytes_sent, total_bytes)` as the upload body is consumed.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[async_trait]
pub trait DocumentApi: Send + Sync + 'static {
    async fn upload(
        &self,
        file: &FileSubmission,
        progress: ProgressFn,
    ) -> Result<FileResponse, ClientError>;

    async fn fetch_tags(&self, file_id: &str) -> Result<Vec<String>, ClientError>;

    async fn file_status(&self, file_id: &str) -> Result<FileStatusResponse, ClientError>;

    async fn list_files(&self) -> Result<Vec<FileResponse>, ClientError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), ClientError>;
}

pub struct HttpDocumentClient {
    client: Client,
    base_url: String,
    credential: Credential,
    timeout: Duration,
    chunk_bytes: usize,
}

impl HttpDocumentClient {
    pub fn new(settings: &ApiSettings, credential: Credential, chunk_bytes: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credential,
            timeout: settings.request_timeout(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/files{}", self.base_url, path)
    }

    /// Stream the content in chunks, reporting progress as each chunk is pulled.
    fn body(&self, file: &FileSubmission, progress: ProgressFn) -> Body {
        let content = file.content.clone();
        let total = content.len();
        let ranges: Vec<(usize, usize)> = (0..total)
            .step_by(self.chunk_bytes)
            .map(|start| (start, (start + self.chunk_bytes).min(total)))
            .collect();

        let chunks = stream::iter(ranges.into_iter().map(move |(start, end)| {
            progress(end as u64, total as u64);
            Ok::<_, std::io::Error>(content[start..end].to_vec())
        }));

        Body::wrap_stream(chunks)
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentClient {
    async fn upload(
        &self,
        file: &FileSubmission,
        progress: ProgressFn,
    ) -> Result<FileResponse, ClientError> {
        let url = self.url("/files");
        let part = Part::stream_with_length(self.body(file, progress), file.byte_size())
            .file_name(file.filename.clone())
            .mime_str(&file.media_type)?;
        let form = Form::new().part("file", part);

        tracing::debug!(filename = %file.filename, bytes = file.byte_size(), "Uploading file");

        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(self.credential.token())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send upload request to {}: {}", url, e);
                ClientError::Http(e)
            })?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn fetch_tags(&self, file_id: &str) -> Result<Vec<String>, ClientError> {
        let url = self.url(&format!("/files/{}/tags", file_id));
        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .send()
            .await?;

        let tags: TagsResponse = ensure_success(response).await?.json().await?;
        Ok(tags.tags)
    }

    async fn file_status(&self, file_id: &str) -> Result<FileStatusResponse, ClientError> {
        let url = self.url(&format!("/files/{}/status", file_id));
        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn list_files(&self) -> Result<Vec<FileResponse>, ClientError> {
        let url = self.url("/files");
        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("/files/{}", file_id));
        let response = self
            .client
            .traced_delete(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}
