use crate::blocks::{placements_key, storage_key, DEFAULT_HTML, DEFAULT_TITLE, DOCUMENT_KEY, TITLE_KEY};
use crate::models::{BlockKind, BlockPayload, BlockPlacement, NotebookSnapshot, Payloads, Placements};
use crate::store::Persistence;
use std::collections::{BTreeMap, HashSet};

/// Live notebook state as read back from the store on startup.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedNotebook {
    pub document_html: String,
    pub title: String,
    pub placements: Placements,
}

#[derive(Clone)]
pub struct SnapshotBuilder {
    persistence: Persistence,
}

impl SnapshotBuilder {
    pub fn new(persistence: Persistence) -> Self {
        Self { persistence }
    }

    pub fn build(&self, document_html: &str, title: &str, placements: &Placements) -> NotebookSnapshot {
        let payloads: Payloads = Payloads::from_fn(|kind| self.collect_payloads(kind, placements.get(kind)));

        NotebookSnapshot {
            document_html: document_html.to_string(),
            title: title.to_string(),
            placements_by_kind: placements.clone(),
            payloads_by_kind: payloads,
        }
    }

    pub fn hydrate(&self) -> HydratedNotebook {
        let document_html = self
            .persistence
            .read_text(DOCUMENT_KEY)
            .unwrap_or_else(|| DEFAULT_HTML.to_string());
        let title = self
            .persistence
            .read_text(TITLE_KEY)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let placements = Placements::from_fn(|kind| {
            let stored = self
                .persistence
                .read_json_or(&placements_key(kind), serde_json::Value::Array(Vec::new()));
            sanitize_placements(&stored)
        });

        HydratedNotebook {
            document_html,
            title,
            placements,
        }
    }

    fn collect_payloads(&self, kind: BlockKind, placements: &[BlockPlacement]) -> BTreeMap<String, BlockPayload> {
        placements
            .iter()
            .filter_map(|placement| {
                self.persistence
                    .read_json::<BlockPayload>(&storage_key(kind, &placement.id))
                    .map(|payload| (placement.id.clone(), payload))
            })
            .collect()
    }
}

/// Accepts `{id}`, legacy `{id, x, y}` and bare id strings; coordinates are
/// dropped. Entries without a usable id are skipped and the first occurrence
/// of a duplicated id wins.
pub fn sanitize_placements(stored: &serde_json::Value) -> Vec<BlockPlacement> {
    let Some(entries) = stored.as_array() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| match entry {
            serde_json::Value::String(id) => Some(id.as_str()),
            serde_json::Value::Object(map) => map.get("id").and_then(|id| id.as_str()),
            _ => None,
        })
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(BlockPlacement::new)
        .collect()
}
