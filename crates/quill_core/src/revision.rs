//! Revision history: autosaves and explicit drafts.
//!
//! Every distinct-content save appends an immutable [`Revision`]. Saves are
//! idempotent on content: the hash of (title, body, metadata) is compared to
//! the current pointer before anything is written.
//!
//! Callers are expected to hold the post's op lock while saving.

use std::collections::HashMap;
use std::sync::Arc;

use crate::content::PreparedPost;
use crate::error::Result;
use crate::storage::{DraftTouch, PostStore};
use crate::types::{NewRevision, Post, PublishPanel, Revision, RevisionInfo, RevisionKind, SaveDraftResult};

/// Outcome of an autosave write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveWrite {
    /// Content equals the pending autosave or the latest draft; no revision
    /// written
    Unchanged,
    /// A new autosave revision was written
    Saved { revision: String },
}

/// Revision operations over a [`PostStore`].
#[derive(Clone)]
pub struct RevisionStore {
    store: Arc<dyn PostStore>,
}

impl RevisionStore {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    /// Latest draft and pending autosave hashes (empty strings if none).
    pub fn revision_info(&self, authperm: &str) -> Result<RevisionInfo> {
        self.store.revision_info(authperm)
    }

    /// Pending autosave hash per authperm, looked up in one batch.
    pub fn autosaves(&self, authperms: &[String]) -> Result<HashMap<String, String>> {
        self.store.autosaves(authperms)
    }

    /// Full history of a post, oldest first.
    pub fn history(&self, authperm: &str) -> Result<Vec<Revision>> {
        self.store.revisions(authperm)
    }

    /// Load one revision by hash.
    pub fn get(&self, authperm: &str, rev_hash: &str) -> Result<Option<Revision>> {
        self.store.get_revision(authperm, rev_hash)
    }

    /// Write an autosave revision unless it would duplicate the pending
    /// autosave or the latest draft.
    ///
    /// Editing back to the latest draft discards the pending autosave.
    /// Creates the post row as a draft on first save.
    pub fn save_autosave(&self, post: &PreparedPost, timestamp: i64) -> Result<AutosaveWrite> {
        let authperm = post.key.authperm();
        let rev_hash = post.content_hash()?;
        let info = self.store.revision_info(&authperm)?;

        if info.autosave_revision == rev_hash {
            return Ok(AutosaveWrite::Unchanged);
        }
        if info.latest_revision == rev_hash {
            if info.has_autosave() {
                self.discard_autosave(post, &info.autosave_revision)?;
            }
            return Ok(AutosaveWrite::Unchanged);
        }

        let mut row = Post::new_draft(&post.key, timestamp);
        row.tags = post.tags.clone();
        row.featured_img = post.featured_img.clone();
        self.store.insert_post_if_absent(&row)?;

        self.store
            .append_revision(&new_revision(post, &rev_hash, timestamp, RevisionKind::Autosave))?;
        log::debug!("autosaved {} as {}", authperm, rev_hash);

        Ok(AutosaveWrite::Saved { revision: rev_hash })
    }

    /// Write a draft revision unless the content equals the latest draft.
    ///
    /// Either way the pending autosave is superseded, so the returned panel
    /// carries an empty autosave pointer. When nothing new is written the
    /// autosave is discarded through the store's autosave floor.
    pub fn save_draft(&self, post: &PreparedPost, timestamp: i64) -> Result<SaveDraftResult> {
        let authperm = post.key.authperm();
        let rev_hash = post.content_hash()?;
        let info = self.store.revision_info(&authperm)?;

        if info.latest_revision == rev_hash {
            if info.has_autosave() {
                self.discard_autosave(post, &info.autosave_revision)?;
            }
            return Ok(SaveDraftResult::AlreadySaved {
                publish_panel: PublishPanel::default(),
            });
        }

        self.store
            .append_revision(&new_revision(post, &rev_hash, timestamp, RevisionKind::Draft))?;
        self.store.touch_post(
            &post.key,
            &DraftTouch {
                date: timestamp,
                tags: &post.tags,
                featured_img: &post.featured_img,
            },
        )?;
        log::info!("saved draft {} as {}", authperm, rev_hash);

        Ok(SaveDraftResult::Saved {
            revision: rev_hash,
            publish_panel: PublishPanel {
                autosave_revision: String::new(),
                date: Some(timestamp),
            },
        })
    }

    fn discard_autosave(&self, post: &PreparedPost, autosave_revision: &str) -> Result<()> {
        self.store.discard_autosaves(&post.key)?;
        log::debug!(
            "discarded autosave {} of {}, content matches the latest draft",
            autosave_revision,
            post.key
        );
        Ok(())
    }
}

fn new_revision(post: &PreparedPost, rev_hash: &str, timestamp: i64, kind: RevisionKind) -> NewRevision {
    NewRevision {
        key: post.key.clone(),
        rev_hash: rev_hash.to_string(),
        title: post.title.clone(),
        body: post.body.clone(),
        metadata: post.metadata.clone(),
        created_at: timestamp,
        kind,
    }
}
