//! The live notebook: owns the document, title and block placements, and
//! routes edits to the store, the sync orchestrator and the event bus.

use crate::analysis::{provider_for, AnalysisProvider, AnalysisTrigger, AnalyzeOutcome};
use crate::blocks::{placements_key, storage_key, BlockIdGenerator, DEFAULT_HTML, DEFAULT_TITLE, DOCUMENT_KEY, TITLE_KEY};
use crate::errors::{AppError, AppResult};
use crate::events::{EventBus, NotebookEvent};
use crate::models::{
    BlockKind, BlockPayload, BlockPlacement, NotebookMetadata, NotebookSettings, NotebookSnapshot, Placements,
    SaveOutcome, SyncStatus,
};
use crate::render::{render_tree, RenderNode};
use crate::snapshot::SnapshotBuilder;
use crate::store::Persistence;
use crate::sync::SyncOrchestrator;
use crate::transport::SaveTransport;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct LiveState {
    document_html: String,
    title: String,
    placements: Placements,
    last_modified: Option<DateTime<Utc>>,
}

impl LiveState {
    fn initial() -> Self {
        Self {
            document_html: DEFAULT_HTML.to_string(),
            title: DEFAULT_TITLE.to_string(),
            placements: Placements::default(),
            last_modified: None,
        }
    }
}

pub struct Notebook {
    persistence: Persistence,
    builder: SnapshotBuilder,
    sync: SyncOrchestrator,
    events: EventBus,
    analysis: AnalysisTrigger,
    settings: NotebookSettings,
    id_generator: BlockIdGenerator,
    state: Mutex<LiveState>,
}

impl Notebook {
    /// Hydrates the notebook from the store.
    pub fn open(persistence: Persistence, settings: NotebookSettings, transport: Arc<dyn SaveTransport>) -> Self {
        let builder = SnapshotBuilder::new(persistence.clone());
        let hydrated = builder.hydrate();
        let events = EventBus::new();
        let sync = SyncOrchestrator::new(
            persistence.clone(),
            transport,
            Duration::from_millis(settings.debounce_ms),
            settings.include_report,
        );
        let analysis = AnalysisTrigger::new(&settings, events.clone());

        tracing::info!(
            title = %hydrated.title,
            blocks = hydrated.placements.iter().map(|(_, list)| list.len()).sum::<usize>(),
            "notebook opened"
        );

        Self {
            persistence,
            builder,
            sync,
            events,
            analysis,
            settings,
            id_generator: BlockIdGenerator::default(),
            state: Mutex::new(LiveState {
                document_html: hydrated.document_html,
                title: hydrated.title,
                placements: hydrated.placements,
                last_modified: None,
            }),
        }
    }

    pub fn with_id_generator(mut self, id_generator: BlockIdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    fn state(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &NotebookSettings {
        &self.settings
    }

    pub fn analysis_provider(&self) -> Arc<dyn AnalysisProvider> {
        provider_for(&self.settings)
    }

    pub fn document_html(&self) -> String {
        self.state().document_html.clone()
    }

    pub fn title(&self) -> String {
        self.state().title.clone()
    }

    pub fn placements(&self) -> Placements {
        self.state().placements.clone()
    }

    /// Records an edit and re-arms the debounced local save. Outside a tokio
    /// runtime the document is written straight away.
    pub fn update_document(&self, document_html: impl Into<String>) {
        let document_html = document_html.into();
        {
            let mut state = self.state();
            state.document_html = document_html.clone();
            state.last_modified = Some(Utc::now());
        }
        self.sync.schedule_local_save(document_html);
    }

    /// Writes any pending document edit without waiting for the debounce.
    pub fn flush(&self) -> bool {
        self.sync.flush_local_save()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.persistence.write_text(TITLE_KEY, &title);
        let mut state = self.state();
        state.title = title;
        state.last_modified = Some(Utc::now());
    }

    /// Appends a new block of `kind` and returns its id.
    pub fn add_block(&self, kind: BlockKind) -> String {
        let id = self.id_generator.generate(kind);
        let mut state = self.state();
        let list = state.placements.get_mut(kind);
        list.push(BlockPlacement::new(id.clone()));
        self.persistence.write_json(&placements_key(kind), &*list);
        state.last_modified = Some(Utc::now());
        tracing::debug!(kind = kind.as_str(), block_id = %id, "block added");
        id
    }

    /// Removes the block and deletes its payload. Returns whether it existed.
    pub fn remove_block(&self, kind: BlockKind, id: &str) -> bool {
        let mut state = self.state();
        let list = state.placements.get_mut(kind);
        let before = list.len();
        list.retain(|placement| placement.id != id);
        if list.len() == before {
            return false;
        }
        self.persistence.write_json(&placements_key(kind), &*list);
        self.persistence.remove_key(&storage_key(kind, id));
        state.last_modified = Some(Utc::now());
        tracing::debug!(kind = kind.as_str(), block_id = %id, "block removed");
        true
    }

    /// Stores the latest payload a block widget produced.
    pub fn save_block_payload(&self, kind: BlockKind, id: &str, payload: BlockPayload) -> AppResult<()> {
        {
            let mut state = self.state();
            if !state.placements.get(kind).iter().any(|placement| placement.id == id) {
                return Err(AppError::NotFound(format!("{} block {}", kind.as_str(), id)));
            }
            state.last_modified = Some(Utc::now());
        }

        if self.persistence.write_json(&storage_key(kind, id), &payload) && kind == BlockKind::Sequence {
            self.events.publish(NotebookEvent::SequenceSaved {
                block_id: id.to_string(),
                payload,
            });
        }
        Ok(())
    }

    pub fn block_payload(&self, kind: BlockKind, id: &str) -> Option<BlockPayload> {
        self.persistence.read_json(&storage_key(kind, id))
    }

    pub fn snapshot(&self) -> NotebookSnapshot {
        let state = self.state().clone();
        self.builder.build(&state.document_html, &state.title, &state.placements)
    }

    pub fn render_tree(&self) -> Vec<RenderNode> {
        let state = self.state();
        render_tree(&state.document_html, &state.placements)
    }

    pub fn metadata(&self) -> NotebookMetadata {
        let state = self.state();
        NotebookMetadata {
            title: state.title.clone(),
            last_saved: self.sync.status().last_remote_sync_at,
            last_modified: state.last_modified,
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    pub async fn save(&self) -> AppResult<SaveOutcome> {
        let state = self.state().clone();
        self.sync
            .save(&state.document_html, &state.title, &state.placements)
            .await
    }

    pub fn analyze(&self) -> AppResult<AnalyzeOutcome> {
        self.analysis.analyze(&self.snapshot())
    }

    /// Deletes every notebook key and returns to a blank notebook.
    pub fn reset(&self) {
        self.sync.reset();
        {
            let mut state = self.state();
            for (kind, list) in state.placements.iter() {
                for placement in list {
                    self.persistence.remove_key(&storage_key(kind, &placement.id));
                }
            }
            for kind in BlockKind::ALL {
                self.persistence.remove_key(&placements_key(kind));
            }
            self.persistence.remove_key(DOCUMENT_KEY);
            self.persistence.remove_key(TITLE_KEY);
            *state = LiveState::initial();
        }
        self.events.publish(NotebookEvent::AnalysisReset);
        tracing::info!("notebook reset");
    }
}

#[cfg(test)]
mod tests {
    use super::Notebook;
    use crate::blocks::{placements_key, storage_key, BlockIdGenerator, DEFAULT_TITLE, DOCUMENT_KEY, TITLE_KEY};
    use crate::events::NotebookEvent;
    use crate::models::{BlockKind, NotebookSettings};
    use crate::render::RenderNode;
    use crate::store::Persistence;
    use crate::transport::NullSaveTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn open(persistence: &Persistence) -> Notebook {
        Notebook::open(persistence.clone(), NotebookSettings::default(), Arc::new(NullSaveTransport))
    }

    #[test]
    fn fresh_notebook_uses_defaults() {
        let notebook = open(&Persistence::in_memory());
        assert_eq!(notebook.title(), DEFAULT_TITLE);
        assert!(notebook.document_html().starts_with("<h1>Untitled Notebook</h1>"));
        assert!(notebook.metadata().last_modified.is_none());
    }

    #[test]
    fn placements_persist_across_reopen() {
        let persistence = Persistence::in_memory();
        let notebook = open(&persistence);
        let first = notebook.add_block(BlockKind::Protocol);
        let second = notebook.add_block(BlockKind::Protocol);
        assert!(first.starts_with("protocol-"));

        let stored: serde_json::Value = persistence
            .read_json(&placements_key(BlockKind::Protocol))
            .expect("stored placements");
        assert_eq!(stored, json!([{ "id": first }, { "id": second }]));

        let reopened = open(&persistence);
        assert_eq!(reopened.placements().protocol, notebook.placements().protocol);
    }

    #[test]
    fn payload_requires_a_placed_block() {
        let notebook = open(&Persistence::in_memory());
        let error = notebook
            .save_block_payload(BlockKind::Table, "ghost", json!({}))
            .expect_err("unknown block");
        assert!(error.to_string().starts_with("NOT_FOUND"));
    }

    #[test]
    fn removing_a_block_deletes_its_payload() {
        let persistence = Persistence::in_memory();
        let notebook = open(&persistence);
        let id = notebook.add_block(BlockKind::Protein);
        notebook
            .save_block_payload(BlockKind::Protein, &id, json!({ "pdbId": "1XYZ" }))
            .expect("save payload");

        assert!(notebook.remove_block(BlockKind::Protein, &id));
        assert!(!notebook.remove_block(BlockKind::Protein, &id));
        assert!(persistence.read_text(&storage_key(BlockKind::Protein, &id)).is_none());
        assert!(notebook.snapshot().payloads_by_kind.protein.is_empty());
    }

    #[tokio::test]
    async fn sequence_payloads_are_announced() {
        let notebook = open(&Persistence::in_memory());
        let mut events = notebook.events().subscribe();
        let id = notebook.add_block(BlockKind::Sequence);
        let payload = json!({ "name": "GFP", "sequence": "MSKGEE" });

        notebook
            .save_block_payload(BlockKind::Sequence, &id, payload.clone())
            .expect("save payload");
        assert_eq!(
            events.recv().await.expect("event"),
            NotebookEvent::SequenceSaved { block_id: id.clone(), payload: payload.clone() }
        );
        assert_eq!(notebook.block_payload(BlockKind::Sequence, &id), Some(payload));
    }

    #[test]
    fn document_edits_outside_a_runtime_are_persisted() {
        let persistence = Persistence::in_memory();
        let notebook = open(&persistence);

        notebook.update_document("<p>x</p>");

        assert_eq!(persistence.read_text(DOCUMENT_KEY).as_deref(), Some("<p>x</p>"));
        assert_eq!(notebook.document_html(), "<p>x</p>");
        assert!(!notebook.sync_status().local_save_pending);
    }

    #[test]
    fn title_is_written_immediately() {
        let persistence = Persistence::in_memory();
        let notebook = open(&persistence);
        notebook.set_title("CFTR rescue");
        assert_eq!(persistence.read_text(TITLE_KEY).as_deref(), Some("CFTR rescue"));
        assert_eq!(notebook.metadata().title, "CFTR rescue");
        assert!(notebook.metadata().last_modified.is_some());
    }

    #[test]
    fn render_tree_tracks_live_placements() {
        let notebook = open(&Persistence::in_memory()).with_id_generator(BlockIdGenerator::Timestamp);
        let id = notebook.add_block(BlockKind::Table);
        let nodes = notebook.render_tree();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].key(), storage_key(BlockKind::Table, &id));
        assert!(matches!(nodes[2], RenderNode::Gap { .. }));
    }

    #[tokio::test]
    async fn reset_clears_keys_and_announces() {
        let persistence = Persistence::in_memory();
        let notebook = open(&persistence);
        let mut events = notebook.events().subscribe();
        notebook.set_title("Doomed");
        let id = notebook.add_block(BlockKind::Table);
        notebook
            .save_block_payload(BlockKind::Table, &id, json!({ "rows": [] }))
            .expect("save payload");

        notebook.reset();

        assert!(persistence.read_text(TITLE_KEY).is_none());
        assert!(persistence.read_text(&placements_key(BlockKind::Table)).is_none());
        assert!(persistence.read_text(&storage_key(BlockKind::Table, &id)).is_none());
        assert_eq!(notebook.title(), DEFAULT_TITLE);
        assert!(notebook.placements().table.is_empty());
        assert_eq!(events.recv().await.expect("event"), NotebookEvent::AnalysisReset);
    }
}
