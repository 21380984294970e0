use crate::errors::{AppError, AppResult};
use crate::models::SaveRequest;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait SaveTransport: Send + Sync {
    async fn send(&self, request: &SaveRequest) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpSaveTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSaveTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SaveTransport for HttpSaveTransport {
    async fn send(&self, request: &SaveRequest) -> AppResult<()> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Remote(format!(
                "Failed to save notebook: {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// Accepts every request without sending it anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSaveTransport;

#[async_trait]
impl SaveTransport for NullSaveTransport {
    async fn send(&self, request: &SaveRequest) -> AppResult<()> {
        tracing::debug!(saved_at = %request.saved_at, "save request discarded by null transport");
        Ok(())
    }
}
