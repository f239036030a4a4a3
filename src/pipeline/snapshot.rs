//! Diagnostic page snapshots
//!
//! Layout: `<root>/<site>/<YYYY-MM-DD>/<slug>.html`. Writing a snapshot never
//! fails the caller; problems are logged and swallowed.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const MAX_SLUG_LEN: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SnapshotSink {
    root: Option<PathBuf>,
}

impl SnapshotSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A sink that only logs
    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn from_option(root: Option<&str>) -> Self {
        root.map(Self::new).unwrap_or_default()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Writes raw page content plus a message
    ///
    /// # Returns
    ///
    /// The written path, or None when disabled or the write failed
    pub async fn write(&self, site: &str, url: &str, message: &str, body: &str) -> Option<PathBuf> {
        tracing::debug!("Snapshot for {}: {}", url, message);

        let root = self.root.as_ref()?;
        let dir = root
            .join(sanitize(site))
            .join(Utc::now().format("%Y-%m-%d").to_string());
        let path = dir.join(format!("{}.html", slug(url)));

        let content = format!(
            "<!-- url: {} -->\n<!-- {} -->\n{}",
            url.replace("--", "- -"),
            message.replace("--", "- -"),
            body
        );

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!("Cannot create snapshot directory {}: {}", dir.display(), e);
            return None;
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!("Cannot write snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Filesystem-safe name for a url, suffixed with a short hash so that
/// truncated slugs stay distinct
fn slug(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let mut base = sanitize(without_scheme);
    if base.len() > MAX_SLUG_LEN {
        base.truncate(MAX_SLUG_LEN);
    }

    let digest = Sha256::digest(url.as_bytes());
    format!("{}-{}", base, &hex::encode(digest)[..8])
}
