//! Navigation contract and error classification

use crate::config::CookieConsentConfig;
use crate::navigation::PageResult;
use crate::proxy::ProxyDescriptor;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Classified navigation failure
///
/// Variants that saw a response body keep it for diagnostic logging.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Not found ({status}): {url}")]
    NotFound {
        url: String,
        status: u16,
        body: Option<String>,
    },

    #[error("HTTP {status} for {url}")]
    Http {
        url: String,
        status: u16,
        retryable: bool,
        body: Option<String>,
    },

    #[error("Transient failure for {url}: {message}")]
    Transient { url: String, message: String },

    #[error("Navigation to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Could not decode {url}: {message}")]
    Decode {
        url: String,
        message: String,
        body: Option<String>,
    },

    #[error("Invalid proxy '{proxy}': {message}")]
    InvalidProxy { proxy: String, message: String },
}

impl NavigationError {
    /// Returns true if the failure is worth another attempt, possibly on
    /// another proxy
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } => *retryable,
            Self::Transient { .. } | Self::Timeout { .. } | Self::Browser(_) => true,
            Self::NotFound { .. } | Self::Decode { .. } | Self::InvalidProxy { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Page content received before the failure, if any
    pub fn captured_body(&self) -> Option<&str> {
        match self {
            Self::NotFound { body, .. } | Self::Http { body, .. } | Self::Decode { body, .. } => {
                body.as_deref()
            }
            _ => None,
        }
    }

    /// Classifies a transport-level reqwest failure
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                after: timeout,
            }
        } else {
            Self::Transient {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Maps a final response status onto the error taxonomy
///
/// | Status | Result |
/// |--------|--------|
/// | 2xx | Ok |
/// | 404, 410 | NotFound (terminal) |
/// | 403, 407, 408, 429, 5xx | Http, retryable |
/// | anything else | Http, not retryable |
pub fn classify_status(url: &str, status: u16, body: Option<String>) -> Result<(), NavigationError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(NavigationError::NotFound {
            url: url.to_string(),
            status,
            body,
        }),
        403 | 407 | 408 | 429 | 500..=599 => Err(NavigationError::Http {
            url: url.to_string(),
            status,
            retryable: true,
            body,
        }),
        _ => Err(NavigationError::Http {
            url: url.to_string(),
            status,
            retryable: false,
            body,
        }),
    }
}

/// Per-request navigation options
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    pub timeout: Duration,
    pub user_agent: String,

    /// Resource types skipped by browser backends
    pub blocked_resource_types: Vec<String>,

    /// Domains skipped by browser backends
    pub blocked_domains: Vec<String>,

    pub cookie_consent: Option<CookieConsentConfig>,
}

impl NavigationOptions {
    pub fn from_config(config: &crate::config::NavigationConfig) -> Self {
        Self {
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            blocked_resource_types: config.blocked_resource_types.clone(),
            blocked_domains: config.blocked_domains.clone(),
            cookie_consent: config.cookie_consent.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self::from_config(&crate::config::NavigationConfig::default())
    }
}

/// Uniform fetch contract implemented by every backend
///
/// Implementations must be interchangeable: callers never branch on which
/// backend is active.
#[async_trait]
pub trait NavigationBackend: Send + Sync {
    /// Fetches one url, optionally through a proxy
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyDescriptor>,
        options: &NavigationOptions,
    ) -> Result<PageResult, NavigationError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Releases sessions, browsers and other held resources
    async fn shutdown(&self) {}
}
