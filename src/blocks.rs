use crate::models::BlockKind;
use chrono::Utc;
use uuid::Uuid;

pub const DOCUMENT_KEY: &str = "labNotebookDocument";
pub const TITLE_KEY: &str = "labNotebookTitle";
pub const SETTINGS_KEY: &str = "labNotebookSettings";

pub const DEFAULT_TITLE: &str = "Untitled Notebook";
pub const DEFAULT_HTML: &str =
    "<h1>Untitled Notebook</h1><p><em>Start typing anywhere in this document…</em></p>";

/// Key holding the payload of one block: `"{kind}-block-{id}"`.
pub fn storage_key(kind: BlockKind, id: &str) -> String {
    format!("{}-block-{}", kind.as_str(), id)
}

/// Key holding the ordered placement list of one kind.
pub fn placements_key(kind: BlockKind) -> String {
    format!("labNotebook{}Blocks", kind.label())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockIdGenerator {
    #[default]
    Uuid,
    /// Millisecond timestamp. Ids created within the same millisecond collide.
    Timestamp,
}

impl BlockIdGenerator {
    pub fn generate(self, kind: BlockKind) -> String {
        match self {
            Self::Uuid => format!("{}-{}", kind.id_prefix(), Uuid::new_v4()),
            Self::Timestamp => format!("{}-{}", kind.id_prefix(), Utc::now().timestamp_millis()),
        }
    }
}

pub fn create_block_id(kind: BlockKind) -> String {
    BlockIdGenerator::default().generate(kind)
}
