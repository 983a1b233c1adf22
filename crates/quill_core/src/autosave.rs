//! Best-effort periodic snapshots of the open editor.
//!
//! An autosave never waits: when another operation holds the post's op lock
//! the tick is skipped, and storage failures are logged and reported in the
//! outcome rather than returned as errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::config::MIN_AUTOSAVE_INTERVAL;
use crate::content::{MetadataExtractor, PreparedPost};
use crate::lock::OpLocks;
use crate::revision::{AutosaveWrite, RevisionStore};
use crate::types::EditorData;

/// What a single autosave attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveOutcome {
    /// A new autosave revision was written
    Saved { revision: String },
    /// Content equals the pending autosave
    Unchanged,
    /// Another operation holds the post; nothing was written
    Locked,
    /// The write failed; the error was logged and dropped
    Failed { reason: String },
}

impl AutosaveOutcome {
    pub fn is_locked(&self) -> bool {
        matches!(self, AutosaveOutcome::Locked)
    }
}

/// Drives autosaves for one editor session.
#[derive(Clone)]
pub struct AutosaveCoordinator {
    revisions: RevisionStore,
    locks: OpLocks,
    extractor: Arc<dyn MetadataExtractor>,
}

impl AutosaveCoordinator {
    pub fn new(
        revisions: RevisionStore,
        locks: OpLocks,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            revisions,
            locks,
            extractor,
        }
    }

    /// One non-blocking autosave attempt.
    pub fn tick(&self, editor: &EditorData, timestamp: i64) -> AutosaveOutcome {
        let key = editor.key();
        let Some(guard) = self.locks.try_acquire(&key) else {
            log::debug!("autosave skipped, {} is busy", key);
            return AutosaveOutcome::Locked;
        };

        let post = PreparedPost::from_editor(editor, self.extractor.as_ref());
        let outcome = match self.revisions.save_autosave(&post, timestamp) {
            Ok(AutosaveWrite::Saved { revision }) => AutosaveOutcome::Saved { revision },
            Ok(AutosaveWrite::Unchanged) => AutosaveOutcome::Unchanged,
            Err(e) => {
                log::warn!("autosave of {} failed: {}", key, e);
                AutosaveOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        guard.release();
        outcome
    }

    /// Autosave every `interval` until `shutdown` fires or its sender is
    /// dropped. Intervals shorter than [`MIN_AUTOSAVE_INTERVAL`] are raised
    /// to it.
    ///
    /// `snapshot` returns the current editor state, or `None` when no post
    /// is open.
    pub async fn run<F>(
        &self,
        interval: Duration,
        mut snapshot: F,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        F: FnMut() -> Option<EditorData>,
    {
        let interval = if interval < MIN_AUTOSAVE_INTERVAL {
            log::warn!(
                "autosave interval {:?} is too short, using {:?}",
                interval,
                MIN_AUTOSAVE_INTERVAL
            );
            MIN_AUTOSAVE_INTERVAL
        } else {
            interval
        };
        log::debug!("autosave loop started ({:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the editor was just opened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::debug!("autosave loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(editor) = snapshot() {
                        self.tick(&editor, chrono::Utc::now().timestamp());
                    }
                }
            }
        }
    }
}
