mod view;

pub use view::{format_confidence, AnalysisView};

use crate::errors::{AppError, AppResult};
use crate::events::{EventBus, NotebookEvent};
use crate::models::{AnalysisMode, AnalysisResult, NotebookSettings, NotebookSnapshot};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MOCK_RESULT_JSON: &str = include_str!("mock_result.json");

/// Source of the analysis payload shown by the report tabs.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken) -> AppResult<AnalysisResult>;
}

pub fn mock_analysis_result() -> AppResult<AnalysisResult> {
    Ok(serde_json::from_str(MOCK_RESULT_JSON)?)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockAnalysisProvider;

#[async_trait]
impl AnalysisProvider for MockAnalysisProvider {
    async fn fetch(&self, cancel: &CancellationToken) -> AppResult<AnalysisResult> {
        if cancel.is_cancelled() {
            return Err(AppError::Aborted("analysis fetch cancelled".to_string()));
        }
        mock_analysis_result()
    }
}

#[derive(Debug, Clone)]
pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisProvider {
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

    async fn request(&self) -> AppResult<AnalysisResult> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Remote(format!(
                "Analysis request failed: {}",
                status.as_u16()
            )));
        }
        Ok(response.json::<AnalysisResult>().await?)
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn fetch(&self, cancel: &CancellationToken) -> AppResult<AnalysisResult> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Aborted("analysis fetch cancelled".to_string())),
            result = self.request() => result,
        }
    }
}

pub fn provider_for(settings: &NotebookSettings) -> std::sync::Arc<dyn AnalysisProvider> {
    match settings.analysis_mode {
        AnalysisMode::Mock => std::sync::Arc::new(MockAnalysisProvider),
        AnalysisMode::Http => std::sync::Arc::new(HttpAnalysisProvider::new(
            settings.analysis_result_endpoint.clone(),
            Duration::from_millis(settings.request_timeout_ms),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    MockPublished,
    Requested,
}

/// Starts an analysis run. Independent of the save state machine.
#[derive(Debug, Clone)]
pub struct AnalysisTrigger {
    mode: AnalysisMode,
    endpoint: String,
    client: reqwest::Client,
    events: EventBus,
}

impl AnalysisTrigger {
    pub fn new(settings: &NotebookSettings, events: EventBus) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            mode: settings.analysis_mode,
            endpoint: settings.analyze_endpoint.clone(),
            client,
            events,
        }
    }

    /// Mock mode publishes the canned result immediately. HTTP mode posts the
    /// snapshot in the background and does not wait for the response, so it
    /// must be called from within a tokio runtime.
    pub fn analyze(&self, snapshot: &NotebookSnapshot) -> AppResult<AnalyzeOutcome> {
        match self.mode {
            AnalysisMode::Mock => {
                let result = mock_analysis_result()?;
                self.events.publish(NotebookEvent::AnalysisMockResult(Box::new(result)));
                Ok(AnalyzeOutcome::MockPublished)
            }
            AnalysisMode::Http => {
                let body = serde_json::to_value(snapshot)?;
                let client = self.client.clone();
                let endpoint = self.endpoint.clone();
                tokio::spawn(async move {
                    match client.post(&endpoint).json(&body).send().await {
                        Ok(response) if response.status().is_success() => {
                            tracing::info!(endpoint = %endpoint, "analysis requested");
                        }
                        Ok(response) => {
                            tracing::warn!(
                                endpoint = %endpoint,
                                status = response.status().as_u16(),
                                "analysis request rejected"
                            );
                        }
                        Err(error) => {
                            tracing::warn!(endpoint = %endpoint, error = %error, "analysis request failed");
                        }
                    }
                });
                Ok(AnalyzeOutcome::Requested)
            }
        }
    }
}
