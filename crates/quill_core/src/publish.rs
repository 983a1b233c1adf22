//! Publishing local edits to the remote ledger.
//!
//! [`PublishPipeline`] walks an explicit state machine:
//!
//! ```text
//! Idle → Locked → Validating → FetchingRemote → Diffing → Submitting → Done
//!           \           \               \                       \
//!            └───────────┴───────────────┴───────────────────────┴→ Failed
//! ```
//!
//! The op lock is taken on entry to `Locked` and released exactly once when
//! the run reaches `Done` or `Failed`. The draft is saved locally before the
//! transaction is submitted, so a rejected submission never loses edits and
//! retrying resubmits exactly what was attempted.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::{MetadataExtractor, PreparedPost};
use crate::error::{QuillError, Result};
use crate::lock::OpLocks;
use crate::patch::create_patch;
use crate::policy::ContentPolicy;
use crate::remote::{Capability, CommentTx, IdentityService, RemoteContent, RemoteLedgerClient, TxReceipt};
use crate::revision::RevisionStore;
use crate::storage::PostStore;
use crate::types::{EditorData, PostStatus, PublishPanel, SaveDraftResult};

/// States of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Idle,
    /// Op lock held, identity being checked
    Locked,
    Validating,
    FetchingRemote,
    /// Building the transaction (patch or full body)
    Diffing,
    /// Saving the draft and submitting the transaction
    Submitting,
    Done,
    Failed,
}

impl PublishState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PublishState::Done | PublishState::Failed)
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishState::Idle => "idle",
            PublishState::Locked => "locked",
            PublishState::Validating => "validating",
            PublishState::FetchingRemote => "fetching_remote",
            PublishState::Diffing => "diffing",
            PublishState::Submitting => "submitting",
            PublishState::Done => "done",
            PublishState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Successful end of a publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The transaction was accepted by the ledger
    Published {
        /// Draft revision written for this publish; `None` when the latest
        /// draft already had this content
        revision: Option<String>,
        publish_panel: PublishPanel,
        receipt: TxReceipt,
    },
    /// The ledger already holds this exact content; nothing was written
    AlreadyPublished { publish_panel: PublishPanel },
}

impl PublishOutcome {
    pub fn was_published(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }
}

/// One publish run over a post.
pub struct PublishPipeline {
    revisions: RevisionStore,
    store: Arc<dyn PostStore>,
    ledger: Arc<dyn RemoteLedgerClient>,
    identity: Arc<dyn IdentityService>,
    policy: Arc<dyn ContentPolicy>,
    extractor: Arc<dyn MetadataExtractor>,
    locks: OpLocks,
    visited: Vec<PublishState>,
}

impl PublishPipeline {
    pub fn new(
        store: Arc<dyn PostStore>,
        ledger: Arc<dyn RemoteLedgerClient>,
        identity: Arc<dyn IdentityService>,
        policy: Arc<dyn ContentPolicy>,
        extractor: Arc<dyn MetadataExtractor>,
        locks: OpLocks,
    ) -> Self {
        Self {
            revisions: RevisionStore::new(store.clone()),
            store,
            ledger,
            identity,
            policy,
            extractor,
            locks,
            visited: vec![PublishState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> PublishState {
        self.visited.last().copied().unwrap_or(PublishState::Idle)
    }

    /// Every state entered by the last run, in order.
    pub fn visited(&self) -> &[PublishState] {
        &self.visited
    }

    /// Publish the editor content at `timestamp` (unix seconds).
    pub async fn run(&mut self, editor: &EditorData, timestamp: i64) -> Result<PublishOutcome> {
        self.visited = vec![PublishState::Idle];
        let key = editor.key();

        let guard = self.locks.acquire(&key).await;
        self.enter(PublishState::Locked);

        let result = self.run_locked(editor, timestamp).await;

        match &result {
            Ok(outcome) => {
                self.enter(PublishState::Done);
                if outcome.was_published() {
                    log::info!("published {}", key);
                } else {
                    log::info!("{} is already published with this content", key);
                }
            }
            Err(e) => {
                log::debug!("publish of {} failed in {}: {}", key, self.state(), e);
                self.enter(PublishState::Failed);
            }
        }

        guard.release();
        result
    }

    async fn run_locked(&mut self, editor: &EditorData, timestamp: i64) -> Result<PublishOutcome> {
        let key = editor.key();

        let status = self
            .identity
            .use_identity(&key.author, &[Capability::Posting])
            .await?;
        if !status.is_good() {
            return Err(QuillError::Unauthorized {
                author: key.author.clone(),
                reason: status.describe().to_string(),
            });
        }

        self.enter(PublishState::Validating);
        let post = PreparedPost::from_editor(editor, self.extractor.as_ref());
        self.policy.check(&post)?;

        self.enter(PublishState::FetchingRemote);
        let remote = self.ledger.get_content(&key.author, &key.permlink).await?;

        if let Some(remote) = &remote {
            if remote.archived {
                return Err(QuillError::Archived(key.to_string()));
            }
            if matches_remote(&post, remote)? {
                return Ok(PublishOutcome::AlreadyPublished {
                    publish_panel: PublishPanel::default(),
                });
            }
        }

        self.enter(PublishState::Diffing);
        let tx = build_tx(&post, remote.as_ref())?;

        self.enter(PublishState::Submitting);
        let revision = match self.revisions.save_draft(&post, timestamp)? {
            SaveDraftResult::Saved { revision, .. } => Some(revision),
            SaveDraftResult::AlreadySaved { .. } => None,
        };
        let receipt = self.ledger.submit(&tx).await?;

        // The transaction is on chain; a local status failure only delays
        // the row until the next remote status refresh.
        if let Err(e) = self.store.set_status(&key, PostStatus::Published) {
            log::warn!(
                "{} published in tx {} but its status could not be saved: {}",
                key,
                receipt.tx_id,
                e
            );
        }

        Ok(PublishOutcome::Published {
            revision,
            publish_panel: PublishPanel {
                autosave_revision: String::new(),
                date: Some(timestamp),
            },
            receipt,
        })
    }

    fn enter(&mut self, state: PublishState) {
        log::debug!("publish: {} -> {}", self.state(), state);
        self.visited.push(state);
    }
}

/// Build the comment transaction.
///
/// Edits of existing remote content send a patch against the remote body and
/// keep its parent reference; new posts send the full body under the first tag.
fn build_tx(post: &PreparedPost, remote: Option<&RemoteContent>) -> Result<CommentTx> {
    let (parent_permlink, body) = match remote {
        Some(remote) => (
            remote.parent_permlink.clone(),
            create_patch(&remote.body, &post.body),
        ),
        None => (
            post.tags.first().cloned().unwrap_or_default(),
            post.body.clone(),
        ),
    };

    Ok(CommentTx {
        parent_author: String::new(),
        parent_permlink,
        author: post.key.author.clone(),
        permlink: post.key.permlink.clone(),
        title: post.title.clone(),
        body,
        json_metadata: post.metadata.to_json_string()?,
    })
}

/// Whether the remote already holds this content.
///
/// Titles compare trimmed, bodies compare with line endings and trailing
/// whitespace normalized, metadata compares as parsed JSON.
fn matches_remote(post: &PreparedPost, remote: &RemoteContent) -> Result<bool> {
    if post.title.trim() != remote.title.trim() {
        return Ok(false);
    }
    if normalize_body(&post.body) != normalize_body(&remote.body) {
        return Ok(false);
    }

    let local = serde_json::to_value(&post.metadata)?;
    match serde_json::from_str::<serde_json::Value>(&remote.json_metadata) {
        Ok(remote) => Ok(local == remote),
        Err(_) => Ok(false),
    }
}

fn normalize_body(body: &str) -> String {
    body.replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}
