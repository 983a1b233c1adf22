#![doc = include_str!("../README.md")]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Posts, revisions and editor input
pub mod types;

/// Storage backends for posts and revisions
pub mod storage;

/// Editor input to hashable content
pub mod content;

/// Revision history (autosaves and drafts)
pub mod revision;

/// Per-post op locks
pub mod lock;

/// Remote ledger and identity vault interfaces
pub mod remote;

/// Permlink generation
pub mod permlink;

/// Text patches against remote bodies
pub mod patch;

/// Content rules checked before publishing
pub mod policy;

/// Periodic autosave
pub mod autosave;

/// Publish pipeline (state machine)
pub mod publish;

/// Moving drafts between authors
pub mod author;

/// The Quill context
pub mod quill;

#[cfg(test)]
pub mod test_utils;

pub use author::AuthorChangeOutcome;
pub use autosave::{AutosaveCoordinator, AutosaveOutcome};
pub use config::QuillConfig;
pub use content::{ExtractedMeta, MetadataExtractor, NoopExtractor, PreparedPost};
pub use error::{QuillError, Result, SerializableError};
pub use lock::{OpGuard, OpLocks};
pub use policy::{ContentPolicy, DefaultPolicy};
pub use publish::{PublishOutcome, PublishPipeline, PublishState};
pub use quill::{LoadedPost, PostListItem, PostListing, Quill, QuillBuilder};
pub use remote::{
    BoxFuture, Capability, CommentTx, IdentityService, IdentityStatus, IdentitySummary,
    RemoteContent, RemoteLedgerClient, SwitchStatus, TxReceipt,
};
pub use storage::{MemoryStore, PostStore};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use types::{
    EditorData, Post, PostKey, PostMetadata, PostStatus, PublishPanel, Revision, RevisionInfo,
    RevisionKind, SaveDraftResult,
};
