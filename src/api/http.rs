//! HTTP implementation of the upload service

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::types::{
    ChunkReceipt, ErrorBody, FinalizeRequest, FinalizeResult, HealthStatus, InitiateRequest,
    InitiateResponse, MonitoringStats, SessionStatus,
};
use super::{ServiceResult, UploadService};
use crate::config::ApiConfig;
use crate::error::ServiceError;

#[derive(Debug, Clone)]
pub struct HttpUploadService {
    client: Client,
    base_url: String,
}

impl HttpUploadService {
    pub fn new(config: &ApiConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, path: &str, session_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            path,
            urlencoding::encode(session_id)
        )
    }
}

/// Turn a non-2xx response into a ServiceError, keeping the server's message
async fn check_status(response: Response) -> ServiceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()));
    Err(ServiceError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> ServiceResult<T> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::Decode(e.to_string()))
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn initiate(&self, request: &InitiateRequest) -> ServiceResult<String> {
        let response = self
            .client
            .post(self.url("/upload/initiate"))
            .json(request)
            .send()
            .await?;
        let body: InitiateResponse = read_json(response).await?;
        debug!(
            "http_initiate: {} -> session={}",
            request.filename, body.upload_id
        );
        Ok(body.upload_id)
    }

    async fn upload_chunk(
        &self,
        session_id: &str,
        chunk_index: u32,
        bytes: Vec<u8>,
    ) -> ServiceResult<ChunkReceipt> {
        let part = Part::bytes(bytes)
            .file_name(format!("chunk_{}", chunk_index))
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("upload_id", session_id.to_string())
            .text("chunk_index", chunk_index.to_string())
            .part("chunk", part);

        let response = self
            .client
            .post(self.url("/upload/chunk"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    async fn status(&self, session_id: &str) -> ServiceResult<SessionStatus> {
        let response = self
            .client
            .get(self.session_url("/upload/status", session_id))
            .send()
            .await?;
        read_json(response).await
    }

    async fn finalize(
        &self,
        session_id: &str,
        requester_id: Option<&str>,
    ) -> ServiceResult<FinalizeResult> {
        let response = self
            .client
            .post(self.url("/upload/finalize"))
            .json(&FinalizeRequest {
                upload_id: session_id,
                user_id: requester_id,
            })
            .send()
            .await?;
        read_json(response).await
    }

    async fn cancel(&self, session_id: &str) -> ServiceResult<()> {
        let response = self
            .client
            .delete(self.session_url("/upload/cancel", session_id))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn monitoring_stats(&self) -> ServiceResult<MonitoringStats> {
        let response = self
            .client
            .get(self.url("/monitoring/stats"))
            .send()
            .await?;
        read_json(response).await
    }

    async fn health(&self) -> ServiceResult<HealthStatus> {
        let response = self
            .client
            .get(self.url("/monitoring/health"))
            .send()
            .await?;
        read_json(response).await
    }
}
