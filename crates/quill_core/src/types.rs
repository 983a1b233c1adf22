//! Core data types for posts, revisions and editor input.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity of a post: unique per (author, permlink).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostKey {
    /// Account that owns the post
    pub author: String,
    /// URL slug, unique per author
    pub permlink: String,
}

impl PostKey {
    /// Create a key from author and permlink
    pub fn new(author: impl Into<String>, permlink: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            permlink: permlink.into(),
        }
    }

    /// The composite `author.permlink` identifier used by revision rows.
    pub fn authperm(&self) -> String {
        format!("{}.{}", self.author, self.permlink)
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.author, self.permlink)
    }
}

/// Lifecycle status of a post row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Only saved locally
    #[default]
    Draft,
    /// Queued for a future publish date
    Scheduled,
    /// Submitted to the ledger
    Published,
    /// Frozen on the ledger; no further edits possible
    Archived,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStatus::Draft => write!(f, "draft"),
            PostStatus::Scheduled => write!(f, "scheduled"),
            PostStatus::Published => write!(f, "published"),
            PostStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(format!("Unknown post status: {}", s)),
        }
    }
}

/// A post row. Content lives in [`Revision`]s; this row carries the
/// listing-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub author: String,
    pub permlink: String,
    pub status: PostStatus,
    /// Unix timestamp (seconds) of the last draft save or publish
    pub date: i64,
    /// Unix timestamp (seconds) the post is scheduled for, if any
    pub scheduled_date: Option<i64>,
    pub tags: Vec<String>,
    /// First image of the body, or empty
    pub featured_img: String,
    /// Last error recorded against the post, or empty
    pub warning_msg: String,
}

impl Post {
    /// Create a fresh draft row
    pub fn new_draft(key: &PostKey, date: i64) -> Self {
        Self {
            author: key.author.clone(),
            permlink: key.permlink.clone(),
            status: PostStatus::Draft,
            date,
            scheduled_date: None,
            tags: Vec::new(),
            featured_img: String::new(),
            warning_msg: String::new(),
        }
    }

    pub fn key(&self) -> PostKey {
        PostKey::new(&self.author, &self.permlink)
    }
}

/// Kind of stored revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionKind {
    /// Written by the periodic autosave
    Autosave,
    /// Written by an explicit save or publish
    Draft,
}

impl fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionKind::Autosave => write!(f, "autosave"),
            RevisionKind::Draft => write!(f, "draft"),
        }
    }
}

impl std::str::FromStr for RevisionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "autosave" => Ok(RevisionKind::Autosave),
            "draft" => Ok(RevisionKind::Draft),
            _ => Err(format!("Unknown revision kind: {}", s)),
        }
    }
}

/// Typed post metadata as stored alongside a revision and sent to the ledger.
///
/// Known keys get typed fields; anything else round-trips through `extra`
/// in its original order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Mentioned users
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,

    /// Image URLs, first one is the featured image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Unknown keys
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl PostMetadata {
    /// Parse metadata from its JSON form
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize metadata to its JSON form
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The featured image, if the metadata carries one
    pub fn featured_image(&self) -> Option<&str> {
        self.image.first().map(String::as_str)
    }
}

/// An immutable stored snapshot of a post's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Storage sequence number; strictly increasing in write order
    pub seq: i64,
    pub author: String,
    pub permlink: String,
    pub authperm: String,
    /// Content hash over (title, body, metadata)
    pub rev_hash: String,
    pub title: String,
    pub body: String,
    pub metadata: PostMetadata,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    pub kind: RevisionKind,
}

/// A revision about to be written; the store assigns `seq`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRevision {
    pub key: PostKey,
    pub rev_hash: String,
    pub title: String,
    pub body: String,
    pub metadata: PostMetadata,
    pub created_at: i64,
    pub kind: RevisionKind,
}

/// Revision pointers for one post. Empty strings mean "none".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Hash of the newest draft revision
    pub latest_revision: String,
    /// Hash of the newest autosave, only if it is newer than the latest draft
    pub autosave_revision: String,
}

impl RevisionInfo {
    pub fn has_autosave(&self) -> bool {
        !self.autosave_revision.is_empty()
    }
}

/// Raw editor state for one post, as submitted by the authoring UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorData {
    pub author: String,
    pub permlink: String,
    pub title: String,
    pub body: String,
    /// Whitespace-separated tag list
    pub tags: String,
    /// Free-form JSON merged into the metadata; ignored when invalid
    pub additional_json: String,
}

impl EditorData {
    pub fn key(&self) -> PostKey {
        PostKey::new(&self.author, &self.permlink)
    }

    /// Tags split on whitespace with empties removed
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.split_whitespace().map(str::to_string).collect()
    }
}

/// Ephemeral data returned to the publish panel after a save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPanel {
    /// Pending autosave hash, empty once a draft supersedes it
    pub autosave_revision: String,
    /// Unix timestamp (seconds) of the save, when one happened
    pub date: Option<i64>,
}

/// Result of an explicit draft save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveDraftResult {
    /// Content equals the latest draft; no revision was written. The panel
    /// carries an empty autosave pointer, so the caller clears any autosave
    /// marker it shows.
    AlreadySaved { publish_panel: PublishPanel },
    /// A new draft revision was written
    Saved {
        revision: String,
        publish_panel: PublishPanel,
    },
}

impl SaveDraftResult {
    pub fn was_saved(&self) -> bool {
        matches!(self, SaveDraftResult::Saved { .. })
    }

    pub fn publish_panel(&self) -> &PublishPanel {
        match self {
            SaveDraftResult::AlreadySaved { publish_panel }
            | SaveDraftResult::Saved { publish_panel, .. } => publish_panel,
        }
    }

    /// Whether the caller should drop its autosave marker; always true
    /// after a draft save of either kind.
    pub fn clears_autosave(&self) -> bool {
        self.publish_panel().autosave_revision.is_empty()
    }
}
