//! External collaborators: the remote ledger and the identity vault.
//!
//! Both traits are object-safe so they can live behind `Arc<dyn ...>` in the
//! [`Quill`](crate::Quill) context. To enable this, all async methods return
//! boxed futures. Implementations enforce their own timeouts and report them
//! as errors; nothing here wraps calls in a local timeout.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A boxed future for object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Content currently stored on the ledger for one (author, permlink).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContent {
    pub title: String,
    pub body: String,
    /// Metadata as the raw JSON string stored on chain
    pub json_metadata: String,
    /// Parent permlink (the category tag for top-level posts)
    pub parent_permlink: String,
    /// The post can no longer be edited
    pub archived: bool,
}

/// A comment/post write operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentTx {
    /// Empty for top-level posts
    pub parent_author: String,
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    pub title: String,
    /// Full body for new posts, or a patch against the remote body
    pub body: String,
    pub json_metadata: String,
}

/// Ledger acknowledgement of a submitted transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub block_num: Option<u64>,
}

/// Read/write access to the remote ledger.
pub trait RemoteLedgerClient: Send + Sync {
    /// Fetch the content stored for (author, permlink).
    ///
    /// Returns `None` if nothing has been published there. Connection
    /// problems are reported as [`QuillError::RemoteUnavailable`](crate::QuillError::RemoteUnavailable).
    fn get_content<'a>(
        &'a self,
        author: &'a str,
        permlink: &'a str,
    ) -> BoxFuture<'a, Result<Option<RemoteContent>>>;

    /// Sign with the active identity and broadcast.
    ///
    /// Rejections are reported as [`QuillError::Submission`](crate::QuillError::Submission).
    fn submit<'a>(&'a self, tx: &'a CommentTx) -> BoxFuture<'a, Result<TxReceipt>>;
}

/// Signing capability an identity may hold for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Publish and edit posts
    Posting,
    /// Transfer funds
    Active,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Posting => write!(f, "posting"),
            Capability::Active => write!(f, "active"),
        }
    }
}

/// Answer of the identity vault to a `use_identity` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    /// The account is available with every requested capability
    Good,
    /// The vault holds no such account
    NotFound,
    /// The account lacks a key for one of the capabilities
    MissingKey,
    /// The vault is encrypted and has not been unlocked
    VaultLocked,
    /// The vault is busy loading or rewriting its data
    Busy,
}

impl IdentityStatus {
    pub fn is_good(self) -> bool {
        self == IdentityStatus::Good
    }

    /// Human-readable explanation of a non-good status.
    pub fn describe(self) -> &'static str {
        match self {
            IdentityStatus::Good => "account ready",
            IdentityStatus::NotFound => "this account has not been added",
            IdentityStatus::MissingKey => "this account is missing the key required for this action",
            IdentityStatus::VaultLocked => "unlock your accounts with the master passphrase first",
            IdentityStatus::Busy => "account data is being updated, try again shortly",
        }
    }
}

/// Result of switching the active identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStatus {
    Switched,
    NotSwitched,
}

/// Snapshot of the identity vault, shown after an author change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub accounts: Vec<String>,
    pub active: String,
    pub is_encrypted: bool,
    pub is_unlocked: bool,
}

/// Credential/session vault deciding which accounts may sign writes.
pub trait IdentityService: Send + Sync {
    /// Make `author` the signing identity if it holds every capability.
    fn use_identity<'a>(
        &'a self,
        author: &'a str,
        required: &'a [Capability],
    ) -> BoxFuture<'a, Result<IdentityStatus>>;

    /// Make `author` the active identity of the session.
    fn switch_identity<'a>(&'a self, author: &'a str) -> BoxFuture<'a, Result<SwitchStatus>>;

    /// Describe the vault.
    fn summary(&self) -> BoxFuture<'_, Result<IdentitySummary>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_status_text() {
        assert!(IdentityStatus::Good.is_good());
        assert!(!IdentityStatus::VaultLocked.is_good());
        assert!(IdentityStatus::MissingKey.describe().contains("key"));
    }

    #[test]
    fn test_comment_tx_serializes() {
        let tx = CommentTx {
            parent_author: String::new(),
            parent_permlink: "rust".to_string(),
            author: "alice".to_string(),
            permlink: "hello".to_string(),
            title: "Hello".to_string(),
            body: "Hi".to_string(),
            json_metadata: "{}".to_string(),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["parent_permlink"], "rust");
        assert_eq!(json["parent_author"], "");
    }
}
