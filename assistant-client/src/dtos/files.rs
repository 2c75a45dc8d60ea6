use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{RetrievalContext, TaskId, TransferTask};

use super::frames::RagContextItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    pub file_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub user_id: Option<String>,
    /// RFC 3339, or a naive timestamp that is taken as UTC.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FileResponse {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
            })
            .ok()
    }
}

impl From<FileResponse> for TransferTask {
    fn from(file: FileResponse) -> Self {
        let created_at = file.created_at().unwrap_or_else(Utc::now);
        TransferTask::remote(
            TaskId::canonical(file.file_id),
            file.filename,
            file.size,
            file.content_type,
            created_at,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatusResponse {
    pub file_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub content: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub content: String,
    #[serde(rename = "ragContext", default)]
    pub rag_context: Vec<RagContextItem>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ActionResponse {
    pub fn retrieval_context(&self) -> Vec<RetrievalContext> {
        self.rag_context
            .iter()
            .map(|item| RetrievalContext {
                text: item.text.clone(),
                source: item.metadata.source.clone(),
                relevance_score: item.relevance_score,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub message: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// `{status, message}` acknowledgement used by delete, clear and reindex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessageResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferStatus;

    #[test]
    fn test_file_response_becomes_processed_task() {
        let json = r#"{
            "file_id": "7d3e",
            "filename": "invoice.pdf",
            "content_type": "application/pdf",
            "size": 2048,
            "user_id": "42",
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        let file: FileResponse = serde_json::from_str(json).unwrap();
        let task: TransferTask = file.into();

        assert_eq!(task.id.as_str(), "7d3e");
        assert_eq!(task.status, TransferStatus::Processed);
        assert_eq!(task.byte_size, 2048);
        assert_eq!(task.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_naive_timestamp_is_read_as_utc() {
        let file = FileResponse {
            file_id: "1".to_string(),
            filename: "a.png".to_string(),
            content_type: "image/png".to_string(),
            size: 1,
            user_id: None,
            created_at: Some("2024-05-01T10:00:00.123456".to_string()),
        };
        assert!(file.created_at().is_some());
    }

    #[test]
    fn test_tags_response_tolerates_missing_fields() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.tags.is_empty());
    }
}
