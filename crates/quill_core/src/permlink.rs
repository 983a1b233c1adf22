//! Permlink (URL slug) generation.
//!
//! Permlinks are at most [`MAX_PERMLINK_LEN`] characters of `[a-z0-9-]`.
//! New permlinks are checked against both the ledger and the local store;
//! on collision a random token is prepended, so the collision path is not
//! deterministic and only uniqueness is guaranteed.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

use crate::config::MAX_PERMLINK_LEN;
use crate::error::{QuillError, Result};
use crate::remote::RemoteLedgerClient;
use crate::storage::PostStore;
use crate::types::PostKey;

/// Timestamp suffix appended by [`reply_permlink`], e.g. `-20230101t120000000z`.
static REPLY_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d{8}t\d{9}z").expect("valid reply timestamp regex"));

/// Enforce the permlink format: keep the last 255 characters, lowercase,
/// and drop everything outside `[a-z0-9-]`.
pub fn clean_permlink(permlink: &str) -> String {
    let count = permlink.chars().count();
    let tail: String = if count > MAX_PERMLINK_LEN {
        permlink.chars().skip(count - MAX_PERMLINK_LEN).collect()
    } else {
        permlink.to_string()
    };

    tail.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Turn a title into a slug.
///
/// Rules:
/// - Lowercase
/// - Replace whitespace and underscores with hyphens
/// - Remove everything else outside `[a-z0-9-]`
/// - Collapse multiple hyphens and trim them from both ends
///
/// Example: "My First Post!!" → "my-first-post"
pub fn slugify(title: &str) -> String {
    let mapped: String = title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                Some(c)
            } else if c.is_whitespace() || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect();

    let collapsed = mapped
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    clean_permlink(&collapsed)
}

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A random lowercase alphanumeric token.
pub fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

/// Permlink for a reply to (parent_author, parent_permlink) at `now`.
///
/// Timestamp suffixes already present on the parent permlink are removed
/// first, so nested replies do not keep growing.
pub fn reply_permlink(parent_author: &str, parent_permlink: &str, now: DateTime<Utc>) -> String {
    let timestamp: String = now
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let stripped = REPLY_TIMESTAMP.replace_all(parent_permlink, "");

    clean_permlink(&format!("re-{}-{}-{}", parent_author, stripped, timestamp))
}

/// Allocates unique permlinks for an author.
#[derive(Clone)]
pub struct PermlinkGenerator {
    store: Arc<dyn PostStore>,
    ledger: Arc<dyn RemoteLedgerClient>,
    token_len: usize,
    attempts: u32,
}

impl PermlinkGenerator {
    pub fn new(
        store: Arc<dyn PostStore>,
        ledger: Arc<dyn RemoteLedgerClient>,
        token_len: usize,
        attempts: u32,
    ) -> Self {
        Self {
            store,
            ledger,
            token_len: token_len.max(1),
            attempts: attempts.max(1),
        }
    }

    /// A permlink for `title` that is free both locally and on the ledger.
    pub async fn generate(&self, author: &str, title: &str) -> Result<String> {
        let mut slug = slugify(title);
        if slug.is_empty() {
            slug = random_token(self.token_len);
        }

        for attempt in 0..self.attempts {
            let candidate = if attempt == 0 {
                slug.clone()
            } else {
                self.prefixed(&slug)
            };

            if !self.is_taken(author, &candidate).await? {
                return Ok(candidate);
            }
            log::debug!("permlink {}.{} is taken", author, candidate);
        }

        Err(QuillError::PermlinkExhausted {
            author: author.to_string(),
            attempts: self.attempts,
        })
    }

    /// A permlink for a post that has no title yet (e.g. after relocation).
    pub async fn draft_permlink(&self, author: &str) -> Result<String> {
        let placeholder = uuid::Uuid::new_v4().to_string();
        self.generate(author, &placeholder).await
    }

    /// Prepend a random token, keeping the result within the length limit
    /// so the token is never truncated away.
    fn prefixed(&self, slug: &str) -> String {
        let token = random_token(self.token_len);
        let room = MAX_PERMLINK_LEN.saturating_sub(token.len() + 1);
        let skip = slug.len().saturating_sub(room);
        clean_permlink(&format!("{}-{}", token, &slug[skip..]))
    }

    async fn is_taken(&self, author: &str, permlink: &str) -> Result<bool> {
        if self.ledger.get_content(author, permlink).await?.is_some() {
            return Ok(true);
        }
        Ok(self
            .store
            .get_post(&PostKey::new(author, permlink))?
            .is_some())
    }
}
