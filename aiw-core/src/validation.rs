//! Validation of caller-supplied names before they reach external tools.
//!
//! Workspace names end up in repository names, container names and DevPod
//! workspace ids, so they are reduced to a conservative slug first.

use crate::error::{CoreError, Result};

pub const MAX_WORKSPACE_NAME_LEN: usize = 100;

/// Reduce a display name to lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Validate a workspace name and return its slug.
pub fn validate_workspace_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Workspace name must not be empty".to_string(),
        ));
    }

    if trimmed.chars().count() > MAX_WORKSPACE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Workspace name must be at most {} characters",
            MAX_WORKSPACE_NAME_LEN
        )));
    }

    let slug = slugify(trimmed);
    if slug.is_empty() {
        return Err(CoreError::Validation(format!(
            "Workspace name '{}' contains no usable characters",
            trimmed
        )));
    }

    Ok(slug)
}
