//! In-process notifications from the notebook to the report views.

use crate::models::AnalysisResult;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum NotebookEvent {
    /// A canned analysis result produced without a network call.
    AnalysisMockResult(Box<AnalysisResult>),
    /// Views drop their displayed analysis and fetch again on next activation.
    AnalysisReset,
    /// Latest payload saved by a sequence editor block.
    SequenceSaved {
        block_id: String,
        payload: serde_json::Value,
    },
}

impl NotebookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalysisMockResult(_) => "analysis:mock-result",
            Self::AnalysisReset => "analysis:reset",
            Self::SequenceSaved { .. } => "sequence:saved",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NotebookEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotebookEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: NotebookEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = name, receivers, "notebook event published");
                receivers
            }
            Err(_) => {
                tracing::debug!(event = name, "notebook event had no subscribers");
                0
            }
        }
    }
}
