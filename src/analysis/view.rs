use super::AnalysisProvider;
use crate::events::NotebookEvent;
use crate::models::{AnalysisResult, ResolvedSource};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

const PUBMED_BASE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

pub fn format_confidence(confidence: Option<f64>) -> String {
    match confidence {
        Some(value) if value.is_finite() => format!("{}%", (value * 100.0).round() as i64),
        _ => "N/A".to_string(),
    }
}

/// State behind the analysis, statistics and cross-reference tabs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisView {
    pub analysis: Option<AnalysisResult>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub has_fetched: bool,
}

impl AnalysisView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads once per fetch cycle while the tab is active.
    pub async fn activate(&mut self, provider: &dyn AnalysisProvider, cancel: &CancellationToken) {
        if self.has_fetched {
            return;
        }
        self.load(provider, cancel).await;
    }

    pub async fn load(&mut self, provider: &dyn AnalysisProvider, cancel: &CancellationToken) {
        self.is_loading = true;
        self.error = None;
        let result = provider.fetch(cancel).await;
        self.is_loading = false;
        match result {
            Ok(analysis) => {
                self.analysis = Some(analysis);
                self.has_fetched = true;
            }
            Err(error) if error.is_aborted() => {
                tracing::debug!("analysis fetch aborted");
            }
            Err(error) => {
                tracing::warn!(error = %error, "analysis fetch failed");
                self.error = Some(error.to_string());
                self.has_fetched = true;
            }
        }
    }

    /// Clears the view so the next activation fetches again.
    pub fn retry(&mut self) {
        *self = Self::default();
    }

    pub fn handle_event(&mut self, event: &NotebookEvent) {
        match event {
            NotebookEvent::AnalysisMockResult(result) => {
                self.analysis = Some(result.as_ref().clone());
                self.error = None;
                self.has_fetched = true;
                self.is_loading = false;
            }
            NotebookEvent::AnalysisReset => self.retry(),
            NotebookEvent::SequenceSaved { .. } => {}
        }
    }

    /// Sources keyed by id, falling back to the name for sources without one.
    pub fn source_by_id(&self) -> BTreeMap<String, ResolvedSource> {
        let mut resolved = BTreeMap::new();
        let Some(analysis) = &self.analysis else {
            return resolved;
        };
        for source in &analysis.sources {
            let Some(id) = source.id.clone().or_else(|| source.name.clone()) else {
                continue;
            };
            let url = source.url.clone().or_else(|| {
                source
                    .pmid
                    .as_ref()
                    .map(|pmid| format!("{}/{}/", PUBMED_BASE_URL, pmid))
            });
            resolved.insert(
                id.clone(),
                ResolvedSource {
                    name: source.name.clone().unwrap_or_else(|| id.clone()),
                    id,
                    url,
                    summary: source.summary.clone(),
                    pmid: source.pmid.clone(),
                },
            );
        }
        resolved
    }

    pub fn resolve_source_ids(&self, ids: &[String]) -> Vec<ResolvedSource> {
        let sources = self.source_by_id();
        ids.iter()
            .map(|id| {
                sources.get(id).cloned().unwrap_or_else(|| ResolvedSource {
                    id: id.clone(),
                    name: id.clone(),
                    url: None,
                    summary: None,
                    pmid: None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{format_confidence, AnalysisView};
    use crate::analysis::{mock_analysis_result, AnalysisProvider, MockAnalysisProvider};
    use crate::errors::{AppError, AppResult};
    use crate::events::NotebookEvent;
    use crate::models::AnalysisResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct FailingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisProvider for FailingProvider {
        async fn fetch(&self, _cancel: &CancellationToken) -> AppResult<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Remote("Analysis request failed: 500".to_string()))
        }
    }

    #[tokio::test]
    async fn activation_fetches_once() {
        let provider = FailingProvider {
            calls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        let mut view = AnalysisView::new();

        view.activate(&provider, &cancel).await;
        view.activate(&provider, &cancel).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(view.error.as_deref(), Some("REMOTE_FAILURE: Analysis request failed: 500"));
        assert!(view.has_fetched);
        assert!(!view.is_loading);

        view.retry();
        assert!(view.error.is_none());
        view.activate(&provider, &cancel).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn aborted_fetch_leaves_view_untouched() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut view = AnalysisView::new();

        view.activate(&MockAnalysisProvider, &cancel).await;
        assert!(view.error.is_none());
        assert!(view.analysis.is_none());
        assert!(!view.has_fetched);
        assert!(!view.is_loading);
    }

    #[test]
    fn mock_event_replaces_state_and_reset_clears_it() {
        let mut view = AnalysisView {
            error: Some("REMOTE_FAILURE: boom".to_string()),
            ..AnalysisView::default()
        };
        let result = mock_analysis_result().expect("mock");
        view.handle_event(&NotebookEvent::AnalysisMockResult(Box::new(result.clone())));
        assert_eq!(view.analysis, Some(result));
        assert!(view.error.is_none());
        assert!(view.has_fetched);

        view.handle_event(&NotebookEvent::AnalysisReset);
        assert_eq!(view, AnalysisView::default());
    }

    #[test]
    fn sources_resolve_with_pubmed_fallback() {
        let view = AnalysisView {
            analysis: Some(mock_analysis_result().expect("mock")),
            ..AnalysisView::default()
        };
        let sources = view.source_by_id();
        assert_eq!(
            sources["S1"].url.as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/15863376/")
        );
        assert_eq!(sources["S2"].url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/21976485/"));
        assert_eq!(sources["Organoid swelling assay"].id, "Organoid swelling assay");

        let resolved = view.resolve_source_ids(&["S1".to_string(), "missing".to_string()]);
        assert_eq!(resolved[0].name, "NBD1 suppressor mutations");
        assert_eq!(resolved[1].name, "missing");
        assert!(resolved[1].url.is_none());
    }

    #[test]
    fn confidence_formats_as_percentage() {
        assert_eq!(format_confidence(Some(0.824)), "82%");
        assert_eq!(format_confidence(None), "N/A");
    }
}
