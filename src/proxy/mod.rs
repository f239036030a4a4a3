//! Proxy pool and allocation strategies
//!
//! The allocator owns the shared rotation state (current index and the
//! should-rotate flag) for one processor run. Every read and advance of that
//! state happens under a single lock.

mod allocator;

pub use allocator::{ProxyAllocator, ProxyLease};

use serde::Deserialize;
use std::fmt;

/// A proxy server plus optional credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ProxyDescriptor {
    /// Proxy URL, e.g. `http://10.0.0.1:8080`
    pub server: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyDescriptor {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the credential pair when both halves are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

// Credentials are never printed
impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.server)
    }
}

/// How proxies are assigned to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyStrategy {
    /// Direct connections
    #[default]
    None,

    /// Worker slot `i` uses proxy `i % pool_size` for the whole batch
    Concurrency,

    /// One sticky proxy, advanced after a retryable failure
    Rotation,

    /// One proxy per batch, advanced at each batch start
    RotationPerBatch,
}

impl ProxyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Concurrency => "concurrency",
            Self::Rotation => "rotation",
            Self::RotationPerBatch => "rotation-per-batch",
        }
    }

    /// Rotation strategies are meaningless without proxies
    pub fn requires_pool(&self) -> bool {
        matches!(self, Self::Rotation | Self::RotationPerBatch)
    }
}

impl fmt::Display for ProxyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_credentials() {
        let proxy = ProxyDescriptor::new("http://10.0.0.1:8080").with_credentials("user", "secret");
        let shown = proxy.to_string();
        assert_eq!(shown, "http://10.0.0.1:8080");
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_credentials_require_both_halves() {
        let mut proxy = ProxyDescriptor::new("http://10.0.0.1:8080");
        proxy.username = Some("user".to_string());
        assert!(proxy.credentials().is_none());

        proxy.password = Some("secret".to_string());
        assert_eq!(proxy.credentials(), Some(("user", "secret")));
    }

    #[test]
    fn test_requires_pool() {
        assert!(!ProxyStrategy::None.requires_pool());
        assert!(!ProxyStrategy::Concurrency.requires_pool());
        assert!(ProxyStrategy::Rotation.requires_pool());
        assert!(ProxyStrategy::RotationPerBatch.requires_pool());
    }
}
