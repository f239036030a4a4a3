//! Static HTTP backend
//!
//! Downloads markup with reqwest. One client (session) is cached per proxy
//! descriptor so connection pools survive across requests.

use crate::navigation::traits::{classify_status, NavigationBackend, NavigationError, NavigationOptions};
use crate::navigation::{PageDocument, PageResult};
use crate::proxy::ProxyDescriptor;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Builds an HTTP client for one proxy (or none)
///
/// # Arguments
///
/// * `user_agent` - User-Agent header sent with every request
/// * `proxy` - Optional proxy; credentials become proxy basic auth
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(NavigationError)` - The proxy URL was rejected or the client failed to build
pub fn build_http_client(
    user_agent: &str,
    proxy: Option<&ProxyDescriptor>,
) -> Result<Client, NavigationError> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(descriptor) = proxy {
        let mut reqwest_proxy =
            Proxy::all(&descriptor.server).map_err(|e| NavigationError::InvalidProxy {
                proxy: descriptor.server.clone(),
                message: e.to_string(),
            })?;
        if let Some((username, password)) = descriptor.credentials() {
            reqwest_proxy = reqwest_proxy.basic_auth(username, password);
        }
        builder = builder.proxy(reqwest_proxy);
    }

    builder.build().map_err(|e| NavigationError::Browser(format!(
        "failed to build HTTP client: {}",
        e
    )))
}

/// Session cache keyed by the full proxy descriptor, credentials included
#[derive(Default)]
pub(crate) struct ClientCache {
    clients: Mutex<HashMap<Option<ProxyDescriptor>, Client>>,
}

impl ClientCache {
    /// Returns the cached client for this proxy, creating it on first use
    pub(crate) fn get(
        &self,
        user_agent: &str,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<Client, NavigationError> {
        let key = proxy.cloned();
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| NavigationError::Browser("client cache lock poisoned".to_string()))?;

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(user_agent, proxy)?;
        tracing::debug!(
            "Created HTTP session for {}",
            proxy.map(|p| p.to_string()).unwrap_or_else(|| "direct".to_string())
        );
        clients.insert(key, client.clone());
        Ok(client)
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.clear();
        }
    }
}

/// Backend that fetches raw markup without rendering
#[derive(Default)]
pub struct StaticHttpBackend {
    sessions: ClientCache,
}

impl StaticHttpBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NavigationBackend for StaticHttpBackend {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyDescriptor>,
        options: &NavigationOptions,
    ) -> Result<PageResult, NavigationError> {
        let client = self.sessions.get(&options.user_agent, proxy)?;

        let response = client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| NavigationError::from_reqwest(url, e, options.timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| NavigationError::from_reqwest(url, e, options.timeout))?;

        classify_status(url, status, Some(html.clone()))?;

        Ok(PageResult::Document(PageDocument {
            url: url.to_string(),
            final_url,
            status,
            html,
        }))
    }

    fn name(&self) -> &'static str {
        "http"
    }

    async fn shutdown(&self) {
        self.sessions.clear();
    }
}
