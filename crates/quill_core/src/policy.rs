//! Content rules checked before anything is sent to the ledger.

use crate::content::PreparedPost;
use crate::error::{QuillError, Result};

/// Decides whether a post may be published.
pub trait ContentPolicy: Send + Sync {
    /// Returns [`QuillError::Validation`] with a user-facing message when the
    /// post breaks a rule.
    fn check(&self, post: &PreparedPost) -> Result<()>;
}

/// Title, body and tag limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPolicy {
    pub max_title_len: usize,
    pub max_tags: usize,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            max_title_len: 255,
            max_tags: 5,
        }
    }
}

impl ContentPolicy for DefaultPolicy {
    fn check(&self, post: &PreparedPost) -> Result<()> {
        let title = post.title.trim();
        if title.is_empty() {
            return Err(QuillError::Validation("Title cannot be empty".to_string()));
        }
        if title.chars().count() > self.max_title_len {
            return Err(QuillError::Validation(format!(
                "Title cannot be longer than {} characters",
                self.max_title_len
            )));
        }
        if post.body.trim().is_empty() {
            return Err(QuillError::Validation("Body cannot be empty".to_string()));
        }
        if post.tags.is_empty() {
            return Err(QuillError::Validation("Add at least one tag".to_string()));
        }
        if post.tags.len() > self.max_tags {
            return Err(QuillError::Validation(format!(
                "Use at most {} tags",
                self.max_tags
            )));
        }
        Ok(())
    }
}
