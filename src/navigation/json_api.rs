//! JSON API backend

use crate::navigation::http::ClientCache;
use crate::navigation::traits::{classify_status, NavigationBackend, NavigationError, NavigationOptions};
use crate::navigation::{JsonPayload, PageResult};
use crate::proxy::ProxyDescriptor;
use async_trait::async_trait;

/// Backend for endpoints that answer with JSON
///
/// Shares the per-proxy session cache with the static HTTP backend and hands
/// back the decoded payload instead of markup.
#[derive(Default)]
pub struct JsonApiBackend {
    sessions: ClientCache,
}

impl JsonApiBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NavigationBackend for JsonApiBackend {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyDescriptor>,
        options: &NavigationOptions,
    ) -> Result<PageResult, NavigationError> {
        let client = self.sessions.get(&options.user_agent, proxy)?;

        let response = client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| NavigationError::from_reqwest(url, e, options.timeout))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| NavigationError::from_reqwest(url, e, options.timeout))?;

        classify_status(url, status, Some(raw.clone()))?;

        let value = serde_json::from_str(&raw).map_err(|e| NavigationError::Decode {
            url: url.to_string(),
            message: e.to_string(),
            body: Some(raw.clone()),
        })?;

        Ok(PageResult::Json(JsonPayload {
            url: url.to_string(),
            status,
            value,
            raw,
        }))
    }

    fn name(&self) -> &'static str {
        "json-api"
    }

    async fn shutdown(&self) {
        self.sessions.clear();
    }
}
