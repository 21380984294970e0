//! Change-set computation between notebook snapshots.
//!
//! The document field gets an append-only diff: when the new markup strictly
//! extends the old one only the suffix travels. Any other edit, including a
//! single character typed mid-document, sends the whole document. Every other
//! field is compared structurally and sent whole when it differs.

use crate::models::{BlockKind, ChangeSet, DocumentChange, NotebookSnapshot};

pub fn diff(current: &NotebookSnapshot, previous: Option<&NotebookSnapshot>) -> ChangeSet {
    let Some(previous) = previous else {
        return full_change_set(current);
    };

    let mut changes = ChangeSet {
        document_html: diff_document(&current.document_html, &previous.document_html),
        ..ChangeSet::default()
    };

    if current.title != previous.title {
        changes.title = Some(current.title.clone());
    }

    for kind in BlockKind::ALL {
        let placements = current.placements_by_kind.get(kind);
        if placements != previous.placements_by_kind.get(kind) {
            changes.placements_by_kind.insert(kind, placements.clone());
        }

        let payloads = current.payloads_by_kind.get(kind);
        if payloads != previous.payloads_by_kind.get(kind) {
            changes.payloads_by_kind.insert(kind, payloads.clone());
        }
    }

    changes
}

pub fn diff_document(current: &str, previous: &str) -> Option<DocumentChange> {
    if current == previous {
        return None;
    }
    match current.strip_prefix(previous) {
        Some(suffix) if !suffix.is_empty() => Some(DocumentChange::Append(suffix.to_string())),
        _ => Some(DocumentChange::Replace(current.to_string())),
    }
}

/// Applies `changes` on top of `base`. Fields absent from the change set keep
/// the base value.
pub fn reconcile(base: &NotebookSnapshot, changes: &ChangeSet) -> NotebookSnapshot {
    let mut next = base.clone();

    match &changes.document_html {
        Some(DocumentChange::Append(suffix)) => next.document_html.push_str(suffix),
        Some(DocumentChange::Replace(value)) => next.document_html = value.clone(),
        None => {}
    }
    if let Some(title) = &changes.title {
        next.title = title.clone();
    }
    for (kind, placements) in &changes.placements_by_kind {
        *next.placements_by_kind.get_mut(*kind) = placements.clone();
    }
    for (kind, payloads) in &changes.payloads_by_kind {
        *next.payloads_by_kind.get_mut(*kind) = payloads.clone();
    }

    next
}

fn full_change_set(current: &NotebookSnapshot) -> ChangeSet {
    ChangeSet {
        document_html: Some(DocumentChange::Replace(current.document_html.clone())),
        title: Some(current.title.clone()),
        placements_by_kind: current
            .placements_by_kind
            .iter()
            .map(|(kind, placements)| (kind, placements.clone()))
            .collect(),
        payloads_by_kind: current
            .payloads_by_kind
            .iter()
            .map(|(kind, payloads)| (kind, payloads.clone()))
            .collect(),
    }
}
