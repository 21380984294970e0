//! Save orchestration: debounced local document persistence and guarded
//! remote sync of change sets.

use crate::blocks::DOCUMENT_KEY;
use crate::delta::diff;
use crate::errors::AppResult;
use crate::models::{NotebookSnapshot, Placements, SaveOutcome, SaveRequest, SyncState, SyncStatus};
use crate::report::build_readable_report;
use crate::scheduler::Debouncer;
use crate::snapshot::SnapshotBuilder;
use crate::store::Persistence;
use crate::transport::SaveTransport;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum LocalPhase {
    #[default]
    Idle,
    Scheduled,
}

#[derive(Debug, Default)]
struct SyncBook {
    local: LocalPhase,
    pending_html: Option<String>,
    remote_in_flight: bool,
    epoch: u64,
    last_synced: Option<NotebookSnapshot>,
    last_local_save_at: Option<DateTime<Utc>>,
    last_remote_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct SyncInner {
    persistence: Persistence,
    builder: SnapshotBuilder,
    transport: Arc<dyn SaveTransport>,
    debouncer: Debouncer,
    debounce: Duration,
    include_report: bool,
    book: Mutex<SyncBook>,
}

impl SyncInner {
    fn book(&self) -> MutexGuard<'_, SyncBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-flight flag however the remote save ends.
struct RemoteSyncGuard {
    inner: Arc<SyncInner>,
}

impl RemoteSyncGuard {
    fn acquire(inner: &Arc<SyncInner>) -> Option<Self> {
        let mut book = inner.book();
        if book.remote_in_flight {
            return None;
        }
        book.remote_in_flight = true;
        book.last_error = None;
        Some(Self { inner: inner.clone() })
    }
}

impl Drop for RemoteSyncGuard {
    fn drop(&mut self) {
        self.inner.book().remote_in_flight = false;
    }
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<SyncInner>,
}

impl SyncOrchestrator {
    pub fn new(
        persistence: Persistence,
        transport: Arc<dyn SaveTransport>,
        debounce: Duration,
        include_report: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                builder: SnapshotBuilder::new(persistence.clone()),
                persistence,
                transport,
                debouncer: Debouncer::new(),
                debounce,
                include_report,
                book: Mutex::new(SyncBook::default()),
            }),
        }
    }

    /// Re-arms the debounce timer with the latest document markup. Without a
    /// tokio runtime the document is written immediately.
    pub fn schedule_local_save(&self, document_html: String) {
        {
            let mut book = self.inner.book();
            book.pending_html = Some(document_html);
            book.local = LocalPhase::Scheduled;
        }
        let this = self.clone();
        let scheduled = self.inner.debouncer.schedule(self.inner.debounce, async move {
            this.run_local_save();
        });
        if !scheduled {
            tracing::debug!("no tokio runtime for debounce; saving document immediately");
            self.run_local_save();
        }
    }

    /// Writes a pending document save now instead of waiting for the timer.
    pub fn flush_local_save(&self) -> bool {
        self.inner.debouncer.cancel();
        self.run_local_save()
    }

    pub fn cancel_local_save(&self) {
        self.inner.debouncer.cancel();
        let mut book = self.inner.book();
        book.pending_html = None;
        book.local = LocalPhase::Idle;
    }

    /// The store write happens under the book lock so a concurrent `reset`
    /// either sees nothing pending or runs after the write.
    fn run_local_save(&self) -> bool {
        let mut book = self.inner.book();
        let Some(document_html) = book.pending_html.take() else {
            return false;
        };
        let written = self.inner.persistence.write_text(DOCUMENT_KEY, &document_html);

        if written {
            book.last_local_save_at = Some(Utc::now());
        }
        book.local = LocalPhase::Idle;
        tracing::debug!(written, bytes = document_html.len(), "local document save finished");
        written
    }

    /// Builds a snapshot of the live state and sends what changed since the
    /// last successful sync. Failures leave the baseline in place so the next
    /// call resends the same changes.
    pub async fn save(&self, document_html: &str, title: &str, placements: &Placements) -> AppResult<SaveOutcome> {
        let Some(_guard) = RemoteSyncGuard::acquire(&self.inner) else {
            tracing::debug!("remote save already in flight; ignoring request");
            return Ok(SaveOutcome::AlreadySyncing);
        };

        let snapshot = self.inner.builder.build(document_html, title, placements);
        let (changes, epoch) = {
            let book = self.inner.book();
            (diff(&snapshot, book.last_synced.as_ref()), book.epoch)
        };
        if changes.is_empty() {
            return Ok(SaveOutcome::NoChanges);
        }

        let saved_at = Utc::now();
        let report = self
            .inner
            .include_report
            .then(|| build_readable_report(&changes, &snapshot, saved_at));
        let request = SaveRequest {
            saved_at,
            changes,
            snapshot,
            report,
        };

        if let Err(error) = self.inner.transport.send(&request).await {
            tracing::warn!(error = %error, "notebook save failed");
            let mut book = self.inner.book();
            if book.epoch == epoch {
                book.last_error = Some(error.to_string());
            }
            return Err(error);
        }

        let SaveRequest { changes, snapshot, .. } = request;
        let mut book = self.inner.book();
        if book.epoch == epoch {
            book.last_synced = Some(snapshot);
            book.last_remote_sync_at = Some(saved_at);
            book.last_error = None;
        } else {
            tracing::info!("notebook was reset during save; discarding sync baseline");
        }
        tracing::info!(saved_at = %saved_at, "notebook synced");
        Ok(SaveOutcome::Synced { saved_at, changes })
    }

    /// Forgets the pending local save, the sync baseline and timestamps.
    pub fn reset(&self) {
        self.inner.debouncer.cancel();
        let mut book = self.inner.book();
        let remote_in_flight = book.remote_in_flight;
        let epoch = book.epoch + 1;
        *book = SyncBook {
            remote_in_flight,
            epoch,
            ..SyncBook::default()
        };
    }

    pub fn status(&self) -> SyncStatus {
        let book = self.inner.book();
        let state = if book.remote_in_flight {
            SyncState::RemoteSyncing
        } else {
            match book.local {
                LocalPhase::Idle => SyncState::Idle,
                LocalPhase::Scheduled => SyncState::LocalSaveScheduled,
            }
        };
        SyncStatus {
            state,
            local_save_pending: book.pending_html.is_some(),
            remote_syncing: book.remote_in_flight,
            last_local_save_at: book.last_local_save_at,
            last_remote_sync_at: book.last_remote_sync_at,
            last_error: book.last_error.clone(),
        }
    }

    pub fn last_synced(&self) -> Option<NotebookSnapshot> {
        self.inner.book().last_synced.clone()
    }
}
