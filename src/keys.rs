//! Cache key derivation.
//!
//! A page is identified by its request path alone: query strings and headers
//! never vary the key.

use std::fmt;
use std::path::{Component, PathBuf};

/// Identity under which a rendered page is cached and stored on disk.
///
/// Normalized so that `/docs/` and `/docs` share one entry; the site root
/// stays `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey(String);

impl PageKey {
    /// Derive the key from a request's logical path.
    pub fn from_path(path: &str) -> Self {
        let mut normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        if normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative artifact location for this key: `<key>.html`, with the site
    /// root mapping to `index.html`.
    ///
    /// Returns `None` when the key contains components that would resolve
    /// outside the artifact root.
    pub fn artifact_rel(&self) -> Option<PathBuf> {
        let trimmed = self.0.trim_start_matches('/');
        let name = if trimmed.is_empty() { "index" } else { trimmed };
        let relative = PathBuf::from(format!("{name}.html"));

        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        safe.then_some(relative)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
