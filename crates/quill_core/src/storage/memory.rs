//! In-memory storage implementation.
//!
//! This provides a simple in-memory implementation of [`PostStore`]
//! for use in unit tests and by embedders that do not need persistence.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{DraftTouch, PostStore, RevisionHead};
use crate::error::{QuillError, Result};
use crate::types::{NewRevision, Post, PostKey, PostStatus, Revision, RevisionKind};

/// In-memory post storage.
///
/// Everything sits behind a single `RwLock`, so multi-row operations such as
/// [`PostStore::relocate`] are atomic. Data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    posts: HashMap<PostKey, Post>,
    /// Revision log in write order
    revisions: Vec<Revision>,
    /// Autosave floor per authperm
    autosave_floors: HashMap<String, i64>,
    next_seq: i64,
    /// Number of mutating calls that changed something
    writes: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating operations that changed stored data.
    pub fn write_count(&self) -> u64 {
        self.read().writes
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PostStore for MemoryStore {
    fn get_post(&self, key: &PostKey) -> Result<Option<Post>> {
        Ok(self.read().posts.get(key).cloned())
    }

    fn insert_post_if_absent(&self, post: &Post) -> Result<bool> {
        let mut inner = self.write();
        let key = post.key();
        if inner.posts.contains_key(&key) {
            return Ok(false);
        }
        inner.posts.insert(key, post.clone());
        inner.writes += 1;
        Ok(true)
    }

    fn touch_post(&self, key: &PostKey, touch: &DraftTouch<'_>) -> Result<()> {
        let mut inner = self.write();
        let post = inner
            .posts
            .entry(key.clone())
            .or_insert_with(|| Post::new_draft(key, touch.date));
        post.date = touch.date;
        post.tags = touch.tags.to_vec();
        post.featured_img = touch.featured_img.to_string();
        inner.writes += 1;
        Ok(())
    }

    fn set_status(&self, key: &PostKey, status: PostStatus) -> Result<bool> {
        let mut inner = self.write();
        let Some(post) = inner.posts.get_mut(key) else {
            return Ok(false);
        };
        post.status = status;
        inner.writes += 1;
        Ok(true)
    }

    fn clear_warning(&self, key: &PostKey) -> Result<bool> {
        let mut inner = self.write();
        let Some(post) = inner.posts.get_mut(key) else {
            return Ok(false);
        };
        post.warning_msg.clear();
        inner.writes += 1;
        Ok(true)
    }

    fn list_posts(
        &self,
        author: &str,
        status: Option<PostStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        let inner = self.read();
        let mut posts: Vec<Post> = inner
            .posts
            .values()
            .filter(|p| p.author == author)
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.permlink.cmp(&b.permlink)));
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }

    fn count_posts(&self, author: &str, status: Option<PostStatus>) -> Result<u64> {
        let inner = self.read();
        Ok(inner
            .posts
            .values()
            .filter(|p| p.author == author)
            .filter(|p| status.is_none_or(|s| p.status == s))
            .count() as u64)
    }

    fn append_revision(&self, revision: &NewRevision) -> Result<i64> {
        let mut inner = self.write();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.revisions.push(Revision {
            seq,
            author: revision.key.author.clone(),
            permlink: revision.key.permlink.clone(),
            authperm: revision.key.authperm(),
            rev_hash: revision.rev_hash.clone(),
            title: revision.title.clone(),
            body: revision.body.clone(),
            metadata: revision.metadata.clone(),
            created_at: revision.created_at,
            kind: revision.kind,
        });
        inner.writes += 1;
        Ok(seq)
    }

    fn get_revision(&self, authperm: &str, rev_hash: &str) -> Result<Option<Revision>> {
        Ok(self
            .read()
            .revisions
            .iter()
            .rev()
            .find(|r| r.authperm == authperm && r.rev_hash == rev_hash)
            .cloned())
    }

    fn latest_revision(&self, authperm: &str, kind: RevisionKind) -> Result<Option<RevisionHead>> {
        Ok(self
            .read()
            .revisions
            .iter()
            .rev()
            .find(|r| r.authperm == authperm && r.kind == kind)
            .map(|r| RevisionHead {
                seq: r.seq,
                rev_hash: r.rev_hash.clone(),
            }))
    }

    fn revisions(&self, authperm: &str) -> Result<Vec<Revision>> {
        Ok(self
            .read()
            .revisions
            .iter()
            .filter(|r| r.authperm == authperm)
            .cloned()
            .collect())
    }

    fn discard_autosaves(&self, key: &PostKey) -> Result<bool> {
        let mut inner = self.write();
        if !inner.posts.contains_key(key) {
            return Ok(false);
        }
        let authperm = key.authperm();
        let floor = inner
            .revisions
            .iter()
            .filter(|r| r.authperm == authperm)
            .map(|r| r.seq)
            .max()
            .unwrap_or(0);
        inner.autosave_floors.insert(authperm, floor);
        inner.writes += 1;
        Ok(true)
    }

    fn autosave_floor(&self, authperm: &str) -> Result<i64> {
        Ok(self.read().autosave_floors.get(authperm).copied().unwrap_or(0))
    }

    fn relocate(&self, from: &PostKey, to: &PostKey) -> Result<()> {
        let mut inner = self.write();
        if inner.posts.contains_key(to) {
            return Err(QuillError::Storage(format!("post '{}' already exists", to)));
        }
        let Some(mut post) = inner.posts.remove(from) else {
            return Err(QuillError::NotFound(from.to_string()));
        };
        post.author = to.author.clone();
        post.permlink = to.permlink.clone();
        inner.posts.insert(to.clone(), post);

        let from_authperm = from.authperm();
        let to_authperm = to.authperm();
        for revision in inner
            .revisions
            .iter_mut()
            .filter(|r| r.authperm == from_authperm)
        {
            revision.author = to.author.clone();
            revision.permlink = to.permlink.clone();
            revision.authperm = to_authperm.clone();
        }
        if let Some(floor) = inner.autosave_floors.remove(&from_authperm) {
            inner.autosave_floors.insert(to_authperm, floor);
        }
        inner.writes += 1;
        Ok(())
    }
}
