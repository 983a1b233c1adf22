//! Turning editor input into storable, hashable post content.
//!
//! Text scanning (mentions, images, links) is done by an external
//! [`MetadataExtractor`]; this module only merges its typed output with the
//! editor's tags and free-form JSON.

use serde::Serialize;

use crate::error::Result;
use crate::types::{EditorData, PostKey, PostMetadata};

/// Typed output of a body scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMeta {
    /// Mentioned users, without the leading `@`
    pub users: Vec<String>,
    /// Image URLs in order of appearance
    pub images: Vec<String>,
    /// Link URLs in order of appearance
    pub links: Vec<String>,
}

/// Scans a post body for users, images and links.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, body: &str) -> ExtractedMeta;
}

/// Extractor that finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractor;

impl MetadataExtractor for NoopExtractor {
    fn extract(&self, _body: &str) -> ExtractedMeta {
        ExtractedMeta::default()
    }
}

/// Post content ready to be hashed, stored or submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPost {
    pub key: PostKey,
    pub title: String,
    pub body: String,
    pub metadata: PostMetadata,
    pub tags: Vec<String>,
    /// First image in the metadata, or empty
    pub featured_img: String,
}

impl PreparedPost {
    /// Assemble content from editor state.
    ///
    /// The additional JSON seeds the metadata and is ignored when it does not
    /// parse. Non-empty editor tags and extracted values replace whatever the
    /// JSON carried for the same keys.
    pub fn from_editor(editor: &EditorData, extractor: &dyn MetadataExtractor) -> Self {
        let mut metadata = if editor.additional_json.trim().is_empty() {
            PostMetadata::default()
        } else {
            match PostMetadata::from_json_str(&editor.additional_json) {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::debug!("ignoring invalid additional JSON for {}: {}", editor.key(), e);
                    PostMetadata::default()
                }
            }
        };

        let tags = editor.tag_list();
        let extracted = extractor.extract(&editor.body);

        if !tags.is_empty() {
            metadata.tags = tags.clone();
        }
        if !extracted.users.is_empty() {
            metadata.users = extracted.users;
        }
        if !extracted.images.is_empty() {
            metadata.image = extracted.images;
        }
        if !extracted.links.is_empty() {
            metadata.links = extracted.links;
        }

        let featured_img = metadata.featured_image().unwrap_or_default().to_string();

        Self {
            key: editor.key(),
            title: editor.title.clone(),
            body: editor.body.clone(),
            metadata,
            tags,
            featured_img,
        }
    }

    /// Stable hash of (title, body, metadata).
    pub fn content_hash(&self) -> Result<String> {
        content_hash(&self.title, &self.body, &self.metadata)
    }
}

#[derive(Serialize)]
struct HashInput<'a> {
    title: &'a str,
    body: &'a str,
    metadata: &'a PostMetadata,
}

/// Hex BLAKE3 digest of the canonical JSON form of (title, body, metadata).
pub fn content_hash(title: &str, body: &str, metadata: &PostMetadata) -> Result<String> {
    let canonical = serde_json::to_vec(&HashInput {
        title,
        body,
        metadata,
    })?;
    Ok(blake3::hash(&canonical).to_hex().to_string())
}
