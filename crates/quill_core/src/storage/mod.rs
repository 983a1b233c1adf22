//! Storage abstraction for posts and revisions.
//!
//! This module defines the [`PostStore`] trait which abstracts over different
//! storage backends (SQLite, in-memory) for persisting post rows and their
//! append-only revision history.
//!
//! # Storage Model
//!
//! 1. **Post rows**: one per (author, permlink), carrying status, dates,
//!    tags, featured image and warning message.
//! 2. **Revision log**: immutable snapshots keyed by authperm, ordered by a
//!    store-assigned sequence number.
//!
//! Revision pointers are derived from the log rather than stored: the latest
//! revision is the newest draft, and the autosave revision is the newest
//! autosave only when it is newer than that draft and than the post's
//! autosave floor. Writing a draft therefore clears the autosave pointer
//! without touching older rows; raising the floor discards pending autosaves
//! when no new draft is written.

use std::collections::HashMap;

use crate::error::Result;
use crate::types::{NewRevision, Post, PostKey, PostStatus, Revision, RevisionInfo, RevisionKind};

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Position of a revision in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionHead {
    /// Store-assigned sequence number
    pub seq: i64,
    /// Content hash of the revision
    pub rev_hash: String,
}

/// Fields written to the post row on every explicit draft save.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTouch<'a> {
    pub date: i64,
    pub tags: &'a [String],
    pub featured_img: &'a str,
}

/// Build [`RevisionInfo`] from the newest draft and newest autosave heads.
///
/// An autosave that is not newer than both the latest draft and
/// `autosave_floor` is stale and reads as empty.
pub fn derive_revision_info(
    latest_draft: Option<RevisionHead>,
    latest_autosave: Option<RevisionHead>,
    autosave_floor: i64,
) -> RevisionInfo {
    let draft_seq = latest_draft.as_ref().map(|h| h.seq).unwrap_or(i64::MIN);
    let autosave_revision = match latest_autosave {
        Some(head) if head.seq > draft_seq && head.seq > autosave_floor => head.rev_hash,
        _ => String::new(),
    };

    RevisionInfo {
        latest_revision: latest_draft.map(|h| h.rev_hash).unwrap_or_default(),
        autosave_revision,
    }
}

/// Trait for post/revision storage backends.
///
/// All operations are parameterized; implementations never interpolate
/// caller strings into queries.
pub trait PostStore: Send + Sync {
    /// Load a post row.
    ///
    /// Returns `None` if the post doesn't exist.
    fn get_post(&self, key: &PostKey) -> Result<Option<Post>>;

    /// Insert a post row unless one already exists for its key.
    ///
    /// Returns true if a row was inserted.
    fn insert_post_if_absent(&self, post: &Post) -> Result<bool>;

    /// Record an explicit draft save: create the row as a draft if missing,
    /// otherwise update date, tags and featured image, keeping status.
    fn touch_post(&self, key: &PostKey, touch: &DraftTouch<'_>) -> Result<()>;

    /// Set the lifecycle status of a post.
    ///
    /// Returns false if the post doesn't exist.
    fn set_status(&self, key: &PostKey, status: PostStatus) -> Result<bool>;

    /// Clear the warning message of a post.
    ///
    /// Returns false if the post doesn't exist.
    fn clear_warning(&self, key: &PostKey) -> Result<bool>;

    /// List an author's posts, newest first.
    fn list_posts(
        &self,
        author: &str,
        status: Option<PostStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>>;

    /// Count an author's posts, optionally restricted to one status.
    fn count_posts(&self, author: &str, status: Option<PostStatus>) -> Result<u64>;

    /// Append a revision to the log.
    ///
    /// Returns the sequence number assigned to it.
    fn append_revision(&self, revision: &NewRevision) -> Result<i64>;

    /// Get the newest revision of a post with the given hash.
    fn get_revision(&self, authperm: &str, rev_hash: &str) -> Result<Option<Revision>>;

    /// Get the newest revision head of the given kind.
    fn latest_revision(&self, authperm: &str, kind: RevisionKind) -> Result<Option<RevisionHead>>;

    /// Get all revisions of a post, oldest first.
    fn revisions(&self, authperm: &str) -> Result<Vec<Revision>>;

    /// Discard every autosave written so far for a post by raising its
    /// autosave floor to the newest revision in the log.
    ///
    /// Returns false if the post doesn't exist.
    fn discard_autosaves(&self, key: &PostKey) -> Result<bool>;

    /// Sequence number at or below which autosaves are discarded (0 if none).
    fn autosave_floor(&self, authperm: &str) -> Result<i64>;

    /// Move a post row, its autosave floor and all of its revisions to a new
    /// key atomically.
    fn relocate(&self, from: &PostKey, to: &PostKey) -> Result<()>;

    /// Derived revision pointers for a post.
    fn revision_info(&self, authperm: &str) -> Result<RevisionInfo> {
        let draft = self.latest_revision(authperm, RevisionKind::Draft)?;
        let autosave = self.latest_revision(authperm, RevisionKind::Autosave)?;
        let floor = self.autosave_floor(authperm)?;
        Ok(derive_revision_info(draft, autosave, floor))
    }

    /// Pending autosave hashes for many posts at once.
    ///
    /// Posts without a pending autosave map to an empty string.
    fn autosaves(&self, authperms: &[String]) -> Result<HashMap<String, String>> {
        let mut out = HashMap::with_capacity(authperms.len());
        for authperm in authperms {
            let info = self.revision_info(authperm)?;
            out.insert(authperm.clone(), info.autosave_revision);
        }
        Ok(out)
    }
}
