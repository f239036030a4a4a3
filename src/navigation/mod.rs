//! Navigation backends
//!
//! This module normalizes four interchangeable fetchers behind one
//! [`NavigationBackend`] contract:
//! - Static HTTP (reqwest)
//! - Locally launched headless Chromium
//! - Remote browser over a DevTools websocket
//! - JSON API
//!
//! Every backend returns a [`PageResult`] or a classified [`NavigationError`].

mod browser;
mod http;
mod json_api;
mod page;
mod traits;

pub use browser::{blocked_url_patterns, BrowserBackend, BrowserMode};
pub use http::{build_http_client, StaticHttpBackend};
pub use json_api::JsonApiBackend;
pub use page::{JsonPayload, PageDocument, PageResult};
pub use traits::{classify_status, NavigationBackend, NavigationError, NavigationOptions};

use crate::config::{BackendKind, NavigationConfig};
use crate::ConfigError;
use std::sync::Arc;

/// Builds the backend selected by `kind`
///
/// # Returns
///
/// * `Err(ConfigError)` - The remote browser backend was selected without a debugging url
pub fn build_backend(
    kind: BackendKind,
    config: &NavigationConfig,
) -> Result<Arc<dyn NavigationBackend>, ConfigError> {
    let backend: Arc<dyn NavigationBackend> = match kind {
        BackendKind::Http => Arc::new(StaticHttpBackend::new()),
        BackendKind::JsonApi => Arc::new(JsonApiBackend::new()),
        BackendKind::Chromium => Arc::new(BrowserBackend::launch()),
        BackendKind::RemoteBrowser => {
            let url = config.remote_debugging_url.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "remote-browser backend requires navigation.remote_debugging_url".to_string(),
                )
            })?;
            Arc::new(BrowserBackend::remote(url))
        }
    };

    tracing::debug!("Built {} navigation backend", backend.name());
    Ok(backend)
}
