//! REST collaborator for message actions and knowledge-base maintenance.

use crate::auth::Credential;
use crate::config::ApiSettings;
use crate::dtos::{ActionRequest, ActionResponse, ExportResponse, StatusMessageResponse};
use crate::models::MessageAction;
use async_trait::async_trait;
use client_core::observability::TracedClientExt;
use client_core::ClientError;
use reqwest::Client;
use std::time::Duration;

use super::ensure_success;

#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn apply_action(
        &self,
        action: MessageAction,
        content: &str,
        model: &str,
    ) -> Result<ActionResponse, ClientError>;

    async fn export(&self, content: &str, model: &str) -> Result<ExportResponse, ClientError>;

    async fn clear_history(&self) -> Result<StatusMessageResponse, ClientError>;

    async fn reindex(&self) -> Result<StatusMessageResponse, ClientError>;
}

pub struct HttpChatClient {
    client: Client,
    base_url: String,
    credential: Credential,
    timeout: Duration,
}

impl HttpChatClient {
    pub fn new(settings: &ApiSettings, credential: Credential) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credential,
            timeout: settings.request_timeout(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/chat{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn apply_action(
        &self,
        action: MessageAction,
        content: &str,
        model: &str,
    ) -> Result<ActionResponse, ClientError> {
        let url = self.url(&format!("/{}", action.as_str()));
        let request = ActionRequest {
            content: content.to_string(),
            model: model.to_string(),
        };

        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn export(&self, content: &str, model: &str) -> Result<ExportResponse, ClientError> {
        let url = self.url("/export");
        let request = ActionRequest {
            content: content.to_string(),
            model: model.to_string(),
        };

        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn clear_history(&self) -> Result<StatusMessageResponse, ClientError> {
        let url = self.url("/clear");
        let response = self
            .client
            .traced_delete(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn reindex(&self) -> Result<StatusMessageResponse, ClientError> {
        let url = self.url("/reindex");
        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(self.credential.token())
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }
}
