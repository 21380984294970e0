use crate::blocks::{storage_key, DOCUMENT_KEY};
use crate::models::{BlockKind, Placements};
use serde::{Deserialize, Serialize};

/// One region of the notebook page, top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RenderNode {
    Document { html: String },
    #[serde(rename_all = "camelCase")]
    Block { kind: BlockKind, id: String, storage_key: String },
    /// Editable text region following a block, keyed by that block's storage key.
    #[serde(rename_all = "camelCase")]
    Gap { after_key: String },
}

pub fn render_tree(document_html: &str, placements: &Placements) -> Vec<RenderNode> {
    let mut nodes = vec![RenderNode::Document {
        html: document_html.to_string(),
    }];
    for kind in BlockKind::ALL {
        for placement in placements.get(kind) {
            let key = storage_key(kind, &placement.id);
            nodes.push(RenderNode::Block {
                kind,
                id: placement.id.clone(),
                storage_key: key.clone(),
            });
            nodes.push(RenderNode::Gap { after_key: key });
        }
    }
    nodes
}

impl RenderNode {
    /// Key of the persisted value behind this region.
    pub fn key(&self) -> &str {
        match self {
            Self::Document { .. } => DOCUMENT_KEY,
            Self::Block { storage_key, .. } => storage_key,
            Self::Gap { after_key } => after_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{render_tree, RenderNode};
    use crate::models::{BlockKind, BlockPlacement, Placements};

    #[test]
    fn blocks_follow_document_in_kind_then_list_order() {
        let mut placements = Placements::default();
        placements.protocol.push(BlockPlacement::new("P1"));
        placements.sequence.push(BlockPlacement::new("seq-2"));
        placements.sequence.push(BlockPlacement::new("seq-1"));

        let nodes = render_tree("<p>x</p>", &placements);
        let keys: Vec<&str> = nodes.iter().map(RenderNode::key).collect();
        assert_eq!(
            keys,
            vec![
                "labNotebookDocument",
                "sequence-block-seq-2",
                "sequence-block-seq-2",
                "sequence-block-seq-1",
                "sequence-block-seq-1",
                "protocol-block-P1",
                "protocol-block-P1",
            ]
        );
        assert!(matches!(nodes[1], RenderNode::Block { kind: BlockKind::Sequence, .. }));
        assert!(matches!(nodes[2], RenderNode::Gap { .. }));
    }

    #[test]
    fn empty_notebook_renders_only_the_document() {
        let nodes = render_tree("", &Placements::default());
        assert_eq!(nodes, vec![RenderNode::Document { html: String::new() }]);
    }
}
