//! Test utilities for quill_core
//!
//! In-memory stand-ins for the remote ledger and the identity vault, plus a
//! store that records its writes. The mocks are cheap to clone and share
//! their state, so a test can keep a handle for assertions after giving a
//! clone to [`Quill`](crate::Quill).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_lite::future;

use crate::error::{QuillError, Result};
use crate::patch::apply_patch;
use crate::remote::{
    BoxFuture, Capability, CommentTx, IdentityService, IdentityStatus, IdentitySummary,
    RemoteContent, RemoteLedgerClient, SwitchStatus, TxReceipt,
};
use crate::storage::{DraftTouch, MemoryStore, PostStore, RevisionHead};
use crate::types::{NewRevision, Post, PostKey, PostStatus, Revision, RevisionKind};

#[derive(Default)]
struct LedgerState {
    contents: HashMap<(String, String), RemoteContent>,
    submissions: Vec<CommentTx>,
    reads: usize,
    unavailable: bool,
    reject: Option<String>,
}

/// A mock ledger.
///
/// Accepted submissions update the stored content the way the real ledger
/// does: the body of an edit is a patch against the previous body.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store content for (author, permlink).
    pub fn put_content(&self, author: &str, permlink: &str, content: RemoteContent) {
        self.state
            .lock()
            .unwrap()
            .contents
            .insert((author.to_string(), permlink.to_string()), content);
    }

    /// Content currently stored for (author, permlink).
    pub fn content(&self, author: &str, permlink: &str) -> Option<RemoteContent> {
        self.state
            .lock()
            .unwrap()
            .contents
            .get(&(author.to_string(), permlink.to_string()))
            .cloned()
    }

    /// Make every call fail with `RemoteUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Reject submissions with the given reason.
    pub fn set_reject(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject = reason.map(str::to_string);
    }

    /// Every accepted submission, in order.
    pub fn submissions(&self) -> Vec<CommentTx> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Number of `get_content` calls so far.
    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }
}

impl RemoteLedgerClient for MockLedger {
    fn get_content<'a>(
        &'a self,
        author: &'a str,
        permlink: &'a str,
    ) -> BoxFuture<'a, Result<Option<RemoteContent>>> {
        Box::pin(async move {
            // Suspend once so concurrent callers interleave like real I/O.
            future::yield_now().await;
            let mut state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(QuillError::RemoteUnavailable("mock ledger offline".to_string()));
            }
            state.reads += 1;
            Ok(state
                .contents
                .get(&(author.to_string(), permlink.to_string()))
                .cloned())
        })
    }

    fn submit<'a>(&'a self, tx: &'a CommentTx) -> BoxFuture<'a, Result<TxReceipt>> {
        Box::pin(async move {
            future::yield_now().await;
            let mut state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(QuillError::RemoteUnavailable("mock ledger offline".to_string()));
            }
            if let Some(reason) = &state.reject {
                return Err(QuillError::Submission(reason.clone()));
            }

            let key = (tx.author.clone(), tx.permlink.clone());
            let body = match state.contents.get(&key) {
                Some(existing) => apply_patch(&existing.body, &tx.body)?,
                None => tx.body.clone(),
            };
            state.contents.insert(
                key,
                RemoteContent {
                    title: tx.title.clone(),
                    body,
                    json_metadata: tx.json_metadata.clone(),
                    parent_permlink: tx.parent_permlink.clone(),
                    archived: false,
                },
            );
            state.submissions.push(tx.clone());

            Ok(TxReceipt {
                tx_id: format!("tx-{}", state.submissions.len()),
                block_num: Some(state.submissions.len() as u64),
            })
        })
    }
}

#[derive(Default)]
struct IdentityState {
    accounts: Vec<String>,
    active: String,
    statuses: HashMap<String, IdentityStatus>,
    switch_status: Option<SwitchStatus>,
    switch_fails: bool,
    switches: Vec<String>,
}

/// A mock identity vault. Accounts report `Good` unless overridden.
#[derive(Clone, Default)]
pub struct MockIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account to the vault (builder pattern).
    pub fn with_account(self, author: &str) -> Self {
        self.state.lock().unwrap().accounts.push(author.to_string());
        self
    }

    /// Override the `use_identity` answer for an author.
    pub fn set_status(&self, author: &str, status: IdentityStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(author.to_string(), status);
    }

    /// Override the `switch_identity` answer.
    pub fn set_switch_status(&self, status: SwitchStatus) {
        self.state.lock().unwrap().switch_status = Some(status);
    }

    /// Make `switch_identity` fail with an error.
    pub fn set_switch_fails(&self, fails: bool) {
        self.state.lock().unwrap().switch_fails = fails;
    }

    /// Authors passed to `switch_identity`, in order.
    pub fn switches(&self) -> Vec<String> {
        self.state.lock().unwrap().switches.clone()
    }
}

impl IdentityService for MockIdentity {
    fn use_identity<'a>(
        &'a self,
        author: &'a str,
        _required: &'a [Capability],
    ) -> BoxFuture<'a, Result<IdentityStatus>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let status = state
                .statuses
                .get(author)
                .copied()
                .unwrap_or(IdentityStatus::Good);
            if status.is_good() {
                state.active = author.to_string();
            }
            Ok(status)
        })
    }

    fn switch_identity<'a>(&'a self, author: &'a str) -> BoxFuture<'a, Result<SwitchStatus>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.switches.push(author.to_string());
            if state.switch_fails {
                return Err(QuillError::Identity("vault unavailable".to_string()));
            }
            let status = state.switch_status.unwrap_or(SwitchStatus::Switched);
            if status == SwitchStatus::Switched {
                state.active = author.to_string();
            }
            Ok(status)
        })
    }

    fn summary(&self) -> BoxFuture<'_, Result<IdentitySummary>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(IdentitySummary {
                accounts: state.accounts.clone(),
                active: state.active.clone(),
                is_encrypted: false,
                is_unlocked: true,
            })
        })
    }
}

/// A [`MemoryStore`] that records every write in order.
///
/// Events look like `append:alice.hello:<body>`, `touch:alice.hello` or
/// `status:alice.hello:published`.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    events: Mutex<Vec<String>>,
    fail_status: Mutex<bool>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set_status` call fail with a storage error.
    pub fn set_status_fails(&self, fails: bool) {
        *self.fail_status.lock().unwrap() = fails;
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Position of the first event starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.events().iter().position(|e| e.starts_with(prefix))
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl PostStore for RecordingStore {
    fn get_post(&self, key: &PostKey) -> Result<Option<Post>> {
        self.inner.get_post(key)
    }

    fn insert_post_if_absent(&self, post: &Post) -> Result<bool> {
        self.record(format!("insert:{}", post.key()));
        self.inner.insert_post_if_absent(post)
    }

    fn touch_post(&self, key: &PostKey, touch: &DraftTouch<'_>) -> Result<()> {
        self.record(format!("touch:{}", key));
        self.inner.touch_post(key, touch)
    }

    fn set_status(&self, key: &PostKey, status: PostStatus) -> Result<bool> {
        if *self.fail_status.lock().unwrap() {
            return Err(QuillError::Storage("database is locked".to_string()));
        }
        self.record(format!("status:{}:{}", key, status));
        self.inner.set_status(key, status)
    }

    fn clear_warning(&self, key: &PostKey) -> Result<bool> {
        self.record(format!("clear_warning:{}", key));
        self.inner.clear_warning(key)
    }

    fn list_posts(
        &self,
        author: &str,
        status: Option<PostStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>> {
        self.inner.list_posts(author, status, limit, offset)
    }

    fn count_posts(&self, author: &str, status: Option<PostStatus>) -> Result<u64> {
        self.inner.count_posts(author, status)
    }

    fn append_revision(&self, revision: &NewRevision) -> Result<i64> {
        self.record(format!("append:{}:{}", revision.key, revision.body));
        self.inner.append_revision(revision)
    }

    fn get_revision(&self, authperm: &str, rev_hash: &str) -> Result<Option<Revision>> {
        self.inner.get_revision(authperm, rev_hash)
    }

    fn latest_revision(&self, authperm: &str, kind: RevisionKind) -> Result<Option<RevisionHead>> {
        self.inner.latest_revision(authperm, kind)
    }

    fn revisions(&self, authperm: &str) -> Result<Vec<Revision>> {
        self.inner.revisions(authperm)
    }

    fn discard_autosaves(&self, key: &PostKey) -> Result<bool> {
        self.record(format!("discard:{}", key));
        self.inner.discard_autosaves(key)
    }

    fn autosave_floor(&self, authperm: &str) -> Result<i64> {
        self.inner.autosave_floor(authperm)
    }

    fn relocate(&self, from: &PostKey, to: &PostKey) -> Result<()> {
        self.record(format!("relocate:{}:{}", from, to));
        self.inner.relocate(from, to)
    }
}
