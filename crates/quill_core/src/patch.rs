//! Text patches between a remote body and a local body.
//!
//! Edits to already-published posts are submitted as a unified diff against
//! the body currently on the ledger instead of the full text.

use diffy::Patch;

use crate::error::{QuillError, Result};

/// Unified diff turning `remote` into `local`.
pub fn create_patch(remote: &str, local: &str) -> String {
    diffy::create_patch(remote, local).to_string()
}

/// Apply a patch produced by [`create_patch`] to `base`.
pub fn apply_patch(base: &str, patch: &str) -> Result<String> {
    let parsed = Patch::from_str(patch).map_err(|e| QuillError::Patch(e.to_string()))?;
    diffy::apply(base, &parsed).map_err(|e| QuillError::Patch(e.to_string()))
}
