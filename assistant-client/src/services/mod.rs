pub mod chat_client;
pub mod document_client;

pub use chat_client::{ChatApi, HttpChatClient};
pub use document_client::{DocumentApi, HttpDocumentClient, ProgressFn};

use client_core::ClientError;

/// Map a non-2xx response to `ClientError::Api`, using FastAPI's `detail` when present.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("detail").map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string())))
        .unwrap_or(body);

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
