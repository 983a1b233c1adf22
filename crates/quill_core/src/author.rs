//! Moving a draft to another author.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{QuillError, Result};
use crate::lock::OpLocks;
use crate::permlink::PermlinkGenerator;
use crate::remote::{IdentityService, IdentitySummary, SwitchStatus};
use crate::storage::PostStore;
use crate::types::{PostKey, PostStatus};

/// Result of an author change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorChangeOutcome {
    /// Where the post lives now
    pub new_key: PostKey,
    /// Vault summary, present when the active identity was switched
    pub identity: Option<IdentitySummary>,
    /// The identity could not be switched; the caller should leave the
    /// editor since the post now belongs to an inactive account
    pub go_home: bool,
}

/// Relocates draft-only posts to a new author.
pub struct AuthorChangeFlow {
    store: Arc<dyn PostStore>,
    permlinks: PermlinkGenerator,
    identity: Arc<dyn IdentityService>,
    locks: OpLocks,
}

impl AuthorChangeFlow {
    pub fn new(
        store: Arc<dyn PostStore>,
        permlinks: PermlinkGenerator,
        identity: Arc<dyn IdentityService>,
        locks: OpLocks,
    ) -> Self {
        Self {
            store,
            permlinks,
            identity,
            locks,
        }
    }

    /// Move the post at `key` and all of its revisions to `new_author`
    /// under a freshly allocated permlink.
    ///
    /// Once the data is moved the change is reported as successful, even if
    /// the identity switch fails.
    pub async fn run(&self, key: &PostKey, new_author: &str) -> Result<AuthorChangeOutcome> {
        let guard = self.locks.acquire(key).await;

        let post = self
            .store
            .get_post(key)?
            .ok_or_else(|| QuillError::NotFound(key.to_string()))?;
        if post.status != PostStatus::Draft {
            return Err(QuillError::NotDraft(key.to_string()));
        }

        let permlink = self.permlinks.draft_permlink(new_author).await?;
        let new_key = PostKey::new(new_author, permlink);
        self.store.relocate(key, &new_key)?;
        log::info!("moved {} to {}", key, new_key);

        let identity = self.switch_identity(new_author).await;
        guard.release();

        Ok(AuthorChangeOutcome {
            go_home: identity.is_none(),
            new_key,
            identity,
        })
    }

    async fn switch_identity(&self, author: &str) -> Option<IdentitySummary> {
        match self.identity.switch_identity(author).await {
            Ok(SwitchStatus::Switched) => match self.identity.summary().await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    log::warn!("switched to {} but could not read the vault: {}", author, e);
                    None
                }
            },
            Ok(SwitchStatus::NotSwitched) => {
                log::warn!("could not switch the active identity to {}", author);
                None
            }
            Err(e) => {
                log::warn!("could not switch the active identity to {}: {}", author, e);
                None
            }
        }
    }
}
