use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type BlockPayload = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Sequence,
    Protein,
    Table,
    Protocol,
}

impl BlockKind {
    /// Render order of the kinds in the notebook.
    pub const ALL: [BlockKind; 4] = [Self::Sequence, Self::Protein, Self::Table, Self::Protocol];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Protein => "protein",
            Self::Table => "table",
            Self::Protocol => "protocol",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sequence => "Sequence",
            Self::Protein => "Protein",
            Self::Table => "Table",
            Self::Protocol => "Protocol",
        }
    }

    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Sequence => "seq",
            Self::Protein => "protein",
            Self::Table => "table",
            Self::Protocol => "protocol",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

/// One value per block kind, serialized as `{sequence, protein, table, protocol}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerKind<T> {
    pub sequence: T,
    pub protein: T,
    pub table: T,
    pub protocol: T,
}

impl<T> PerKind<T> {
    pub fn from_fn(mut f: impl FnMut(BlockKind) -> T) -> Self {
        Self {
            sequence: f(BlockKind::Sequence),
            protein: f(BlockKind::Protein),
            table: f(BlockKind::Table),
            protocol: f(BlockKind::Protocol),
        }
    }

    pub fn get(&self, kind: BlockKind) -> &T {
        match kind {
            BlockKind::Sequence => &self.sequence,
            BlockKind::Protein => &self.protein,
            BlockKind::Table => &self.table,
            BlockKind::Protocol => &self.protocol,
        }
    }

    pub fn get_mut(&mut self, kind: BlockKind) -> &mut T {
        match kind {
            BlockKind::Sequence => &mut self.sequence,
            BlockKind::Protein => &mut self.protein,
            BlockKind::Table => &mut self.table,
            BlockKind::Protocol => &mut self.protocol,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockKind, &T)> {
        BlockKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPlacement {
    pub id: String,
}

impl BlockPlacement {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub type Placements = PerKind<Vec<BlockPlacement>>;
pub type Payloads = PerKind<BTreeMap<String, BlockPayload>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSnapshot {
    pub document_html: String,
    pub title: String,
    pub placements_by_kind: Placements,
    pub payloads_by_kind: Payloads,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "kebab-case")]
pub enum DocumentChange {
    /// Text appended to the end of the previous document.
    Append(String),
    Replace(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_html: Option<DocumentChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub placements_by_kind: BTreeMap<BlockKind, Vec<BlockPlacement>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payloads_by_kind: BTreeMap<BlockKind, BTreeMap<String, BlockPayload>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.document_html.is_none()
            && self.title.is_none()
            && self.placements_by_kind.is_empty()
            && self.payloads_by_kind.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookMetadata {
    pub title: String,
    pub last_saved: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    Idle,
    LocalSaveScheduled,
    LocalSaving,
    RemoteSyncing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub local_save_pending: bool,
    pub remote_syncing: bool,
    pub last_local_save_at: Option<DateTime<Utc>>,
    pub last_remote_sync_at: Option<DateTime<Utc>>,
    /// Message of the most recent failed remote save, cleared when a save starts.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub saved_at: DateTime<Utc>,
    pub changes: ChangeSet,
    pub snapshot: NotebookSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Synced { saved_at: DateTime<Utc>, changes: ChangeSet },
    NoChanges,
    AlreadySyncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    Mock,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotebookSettings {
    pub debounce_ms: u64,
    pub save_endpoint: String,
    pub analyze_endpoint: String,
    pub analysis_result_endpoint: String,
    pub analysis_mode: AnalysisMode,
    pub request_timeout_ms: u64,
    pub include_report: bool,
}

impl Default for NotebookSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 600,
            save_endpoint: "http://localhost:8000/api/notebook/save".to_string(),
            analyze_endpoint: "http://localhost:8000/api/analysis/run".to_string(),
            analysis_result_endpoint: "http://localhost:8000/api/analysis/result".to_string(),
            analysis_mode: AnalysisMode::Mock,
            request_timeout_ms: 15_000,
            include_report: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendedEdit {
    #[serde(default)]
    pub target_protein: Option<String>,
    #[serde(default)]
    pub edit_type: Option<String>,
    #[serde(default)]
    pub edit_details: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditedProtein {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mutations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub interaction: Option<String>,
    #[serde(default)]
    pub mechanism: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pmid: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Payload rendered by the analysis, statistics and cross-reference tabs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub breakthrough_summary: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub recommended_protein_edit: Option<RecommendedEdit>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
    #[serde(default)]
    pub edited_protein: Option<EditedProtein>,
    #[serde(default)]
    pub analysis_summary: Option<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub graph: AnalysisGraph,
    #[serde(default)]
    pub sources: Vec<AnalysisSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSource {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub pmid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{BlockKind, ChangeSet, DocumentChange, NotebookSnapshot, PerKind};

    #[test]
    fn block_kind_parses_wire_names() {
        for kind in BlockKind::ALL {
            assert_eq!(BlockKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BlockKind::parse("chart"), None);
    }

    #[test]
    fn snapshot_serializes_with_per_kind_objects() {
        let snapshot = NotebookSnapshot {
            document_html: "<p>x</p>".to_string(),
            title: "T".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(value["documentHtml"], "<p>x</p>");
        assert!(value["placementsByKind"]["protocol"].is_array());
        assert!(value["payloadsByKind"]["sequence"].is_object());
    }

    #[test]
    fn empty_change_set_serializes_to_empty_object() {
        let value = serde_json::to_value(ChangeSet::default()).expect("serialize");
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn document_change_is_tagged_by_mode() {
        let value = serde_json::to_value(DocumentChange::Append(" more".to_string())).expect("serialize");
        assert_eq!(value, serde_json::json!({ "mode": "append", "value": " more" }));
    }

    #[test]
    fn per_kind_iterates_in_render_order() {
        let counts = PerKind::from_fn(|kind| kind.as_str().len());
        let kinds = counts.iter().map(|(kind, _)| kind).collect::<Vec<_>>();
        assert_eq!(kinds, BlockKind::ALL.to_vec());
        assert_eq!(*counts.get(BlockKind::Table), 5);
    }
}
