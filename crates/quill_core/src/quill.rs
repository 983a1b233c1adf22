//! The Quill context.
//!
//! [`Quill`] owns every collaborator of the revision/publish engine: the
//! local store, the remote ledger, the identity vault, the content policy,
//! the metadata extractor and the op-lock registry. Build one at startup with
//! [`QuillBuilder`] and pass it (or an `Arc` of it) to whatever drives the
//! editor. Separate instances share nothing, so tests get isolated engines.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quill_core::{Quill, QuillConfig};
//!
//! let quill = Quill::builder(Arc::new(ledger), Arc::new(vault))
//!     .config(QuillConfig::load_from("quill.toml")?)
//!     .build()?;
//!
//! let permlink = quill.generate_permlink("alice", "My First Post").await?;
//! let saved = quill.save_draft(&editor).await?;
//! let published = quill.publish(&editor).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::author::{AuthorChangeFlow, AuthorChangeOutcome};
use crate::autosave::{AutosaveCoordinator, AutosaveOutcome};
use crate::config::QuillConfig;
use crate::content::{MetadataExtractor, NoopExtractor, PreparedPost};
use crate::error::{QuillError, Result};
use crate::lock::OpLocks;
use crate::permlink::{PermlinkGenerator, reply_permlink};
use crate::policy::{ContentPolicy, DefaultPolicy};
use crate::publish::{PublishOutcome, PublishPipeline};
use crate::remote::{IdentityService, RemoteContent, RemoteLedgerClient};
use crate::revision::RevisionStore;
use crate::storage::{MemoryStore, PostStore};
use crate::types::{EditorData, Post, PostKey, PostStatus, Revision, RevisionInfo, SaveDraftResult};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// Result types
// ============================================================================

/// A post opened in the editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedPost {
    pub post: Post,
    /// The pending autosave if there is one, otherwise the latest draft
    pub revision: Revision,
    /// Pending autosave hash, empty if none
    pub autosave_revision: String,
}

impl LoadedPost {
    pub fn from_autosave(&self) -> bool {
        !self.autosave_revision.is_empty()
    }

    pub fn tags(&self) -> &[String] {
        &self.revision.metadata.tags
    }
}

/// One row of a post listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostListItem {
    pub post: Post,
    /// The post carries a warning message
    pub had_error: bool,
    /// There is unsaved autosaved content
    pub has_autosave: bool,
}

/// A page of an author's posts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostListing {
    pub posts: Vec<PostListItem>,
    /// Number of matching posts across all pages
    pub total: u64,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Quill`].
pub struct QuillBuilder {
    config: QuillConfig,
    ledger: Arc<dyn RemoteLedgerClient>,
    identity: Arc<dyn IdentityService>,
    store: Option<Arc<dyn PostStore>>,
    policy: Option<Arc<dyn ContentPolicy>>,
    extractor: Option<Arc<dyn MetadataExtractor>>,
}

impl QuillBuilder {
    pub fn new(ledger: Arc<dyn RemoteLedgerClient>, identity: Arc<dyn IdentityService>) -> Self {
        Self {
            config: QuillConfig::default(),
            ledger,
            identity,
            store: None,
            policy: None,
            extractor: None,
        }
    }

    pub fn config(mut self, config: QuillConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of the one named by the config.
    pub fn store(mut self, store: Arc<dyn PostStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn ContentPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build the context, opening the configured database if no store was
    /// given.
    pub fn build(self) -> Result<Quill> {
        self.config.validate()?;
        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config)?,
        };
        let policy = self.policy.unwrap_or_else(|| {
            Arc::new(DefaultPolicy {
                max_title_len: self.config.max_title_len,
                max_tags: self.config.max_tags,
            })
        });
        let extractor = self.extractor.unwrap_or_else(|| Arc::new(NoopExtractor));
        let permlinks = PermlinkGenerator::new(
            store.clone(),
            self.ledger.clone(),
            self.config.random_token_len,
            self.config.permlink_attempts,
        );

        Ok(Quill {
            revisions: RevisionStore::new(store.clone()),
            locks: OpLocks::new(),
            config: self.config,
            store,
            ledger: self.ledger,
            identity: self.identity,
            policy,
            extractor,
            permlinks,
        })
    }
}

#[cfg(feature = "sqlite")]
fn open_store(config: &QuillConfig) -> Result<Arc<dyn PostStore>> {
    match &config.database_path {
        Some(path) => {
            log::debug!("opening post database at {}", path.display());
            Ok(Arc::new(crate::storage::SqliteStore::open(path)?))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
fn open_store(config: &QuillConfig) -> Result<Arc<dyn PostStore>> {
    match &config.database_path {
        Some(path) => Err(QuillError::Storage(format!(
            "cannot open {}: built without the sqlite feature",
            path.display()
        ))),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

// ============================================================================
// Quill
// ============================================================================

/// The revision and publish engine.
pub struct Quill {
    config: QuillConfig,
    store: Arc<dyn PostStore>,
    ledger: Arc<dyn RemoteLedgerClient>,
    identity: Arc<dyn IdentityService>,
    policy: Arc<dyn ContentPolicy>,
    extractor: Arc<dyn MetadataExtractor>,
    locks: OpLocks,
    revisions: RevisionStore,
    permlinks: PermlinkGenerator,
}

impl Quill {
    pub fn builder(
        ledger: Arc<dyn RemoteLedgerClient>,
        identity: Arc<dyn IdentityService>,
    ) -> QuillBuilder {
        QuillBuilder::new(ledger, identity)
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    /// The per-post op-lock registry.
    pub fn locks(&self) -> &OpLocks {
        &self.locks
    }

    // ---- permlinks ----

    /// A permlink for a new post, free locally and on the ledger.
    pub async fn generate_permlink(&self, author: &str, title: &str) -> Result<String> {
        self.permlinks.generate(author, title).await
    }

    /// A permlink for a post without a title.
    pub async fn create_draft_permlink(&self, author: &str) -> Result<String> {
        self.permlinks.draft_permlink(author).await
    }

    /// A permlink for a reply, timestamped now.
    pub fn create_reply_permlink(&self, parent_author: &str, parent_permlink: &str) -> String {
        reply_permlink(parent_author, parent_permlink, chrono::Utc::now())
    }

    // ---- revisions ----

    pub fn revision_info(&self, key: &PostKey) -> Result<RevisionInfo> {
        self.revisions.revision_info(&key.authperm())
    }

    /// Pending autosave hash per authperm.
    pub fn autosaves(&self, authperms: &[String]) -> Result<HashMap<String, String>> {
        self.revisions.autosaves(authperms)
    }

    /// Every revision of a post, oldest first.
    pub fn history(&self, key: &PostKey) -> Result<Vec<Revision>> {
        self.revisions.history(&key.authperm())
    }

    /// A coordinator for periodic autosaves sharing this context's locks.
    pub fn autosave_coordinator(&self) -> AutosaveCoordinator {
        AutosaveCoordinator::new(
            self.revisions.clone(),
            self.locks.clone(),
            self.extractor.clone(),
        )
    }

    /// One autosave attempt; skipped if the post is busy.
    pub fn autosave(&self, editor: &EditorData) -> AutosaveOutcome {
        self.autosave_coordinator().tick(editor, now())
    }

    /// Save the editor content as a draft, waiting for the post's op lock.
    pub async fn save_draft(&self, editor: &EditorData) -> Result<SaveDraftResult> {
        let key = editor.key();
        let guard = self.locks.acquire(&key).await;
        let post = PreparedPost::from_editor(editor, self.extractor.as_ref());
        let result = self.revisions.save_draft(&post, now());
        guard.release();
        result
    }

    /// Save the editor content as a draft only if no other operation holds
    /// the post's op lock.
    ///
    /// Returns [`QuillError::LockContention`] instead of waiting.
    pub fn try_save_draft(&self, editor: &EditorData) -> Result<SaveDraftResult> {
        let key = editor.key();
        let Some(guard) = self.locks.try_acquire(&key) else {
            return Err(QuillError::LockContention(key.to_string()));
        };
        let post = PreparedPost::from_editor(editor, self.extractor.as_ref());
        let result = self.revisions.save_draft(&post, now());
        guard.release();
        result
    }

    // ---- publishing ----

    /// Publish the editor content to the ledger.
    pub async fn publish(&self, editor: &EditorData) -> Result<PublishOutcome> {
        self.publish_pipeline().run(editor, now()).await
    }

    /// A fresh pipeline, for callers that want to inspect the visited states.
    pub fn publish_pipeline(&self) -> PublishPipeline {
        PublishPipeline::new(
            self.store.clone(),
            self.ledger.clone(),
            self.identity.clone(),
            self.policy.clone(),
            self.extractor.clone(),
            self.locks.clone(),
        )
    }

    /// Move a draft to `new_author`.
    pub async fn change_author(&self, key: &PostKey, new_author: &str) -> Result<AuthorChangeOutcome> {
        AuthorChangeFlow::new(
            self.store.clone(),
            self.permlinks.clone(),
            self.identity.clone(),
            self.locks.clone(),
        )
        .run(key, new_author)
        .await
    }

    /// Align the local status with the ledger: archived content marks the
    /// post archived, any other remote content marks it published.
    ///
    /// Returns the resulting status.
    pub async fn refresh_remote_status(&self, key: &PostKey) -> Result<PostStatus> {
        let guard = self.locks.acquire(key).await;

        let post = self
            .store
            .get_post(key)?
            .ok_or_else(|| QuillError::NotFound(key.to_string()))?;
        let remote = self.ledger.get_content(&key.author, &key.permlink).await?;

        let status = match remote {
            Some(remote) if remote.archived => PostStatus::Archived,
            Some(_) => PostStatus::Published,
            None => post.status,
        };
        if status != post.status {
            self.store.set_status(key, status)?;
            log::info!("{} is now {}", key, status);
        }

        guard.release();
        Ok(status)
    }

    /// Content currently on the ledger for (author, permlink).
    pub async fn remote_content(&self, author: &str, permlink: &str) -> Result<Option<RemoteContent>> {
        self.ledger.get_content(author, permlink).await
    }

    // ---- posts ----

    /// Load a post for editing, preferring a pending autosave.
    ///
    /// Returns `None` if the post or its revision is missing.
    pub fn load_post(&self, key: &PostKey) -> Result<Option<LoadedPost>> {
        let Some(post) = self.store.get_post(key)? else {
            return Ok(None);
        };

        let authperm = key.authperm();
        let info = self.revisions.revision_info(&authperm)?;
        let lookup = if info.has_autosave() {
            &info.autosave_revision
        } else {
            &info.latest_revision
        };
        if lookup.is_empty() {
            return Ok(None);
        }

        let Some(revision) = self.revisions.get(&authperm, lookup)? else {
            return Ok(None);
        };

        Ok(Some(LoadedPost {
            post,
            revision,
            autosave_revision: info.autosave_revision,
        }))
    }

    /// Clear the warning message shown on a post.
    pub fn dismiss_warning(&self, key: &PostKey) -> Result<()> {
        if !self.store.clear_warning(key)? {
            return Err(QuillError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// One page of an author's posts, newest first.
    pub fn list_posts(
        &self,
        author: &str,
        status: Option<PostStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<PostListing> {
        let posts = self.store.list_posts(author, status, limit, offset)?;
        let total = self.store.count_posts(author, status)?;

        let authperms: Vec<String> = posts.iter().map(|p| p.key().authperm()).collect();
        let autosaves = self.revisions.autosaves(&authperms)?;

        let posts = posts
            .into_iter()
            .zip(authperms)
            .map(|(post, authperm)| PostListItem {
                had_error: !post.warning_msg.is_empty(),
                has_autosave: autosaves.get(&authperm).is_some_and(|a| !a.is_empty()),
                post,
            })
            .collect();

        Ok(PostListing { posts, total })
    }
}
