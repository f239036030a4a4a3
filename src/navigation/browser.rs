//! Headless browser backends over the Chrome DevTools Protocol
//!
//! Two engines share this implementation: a locally launched Chromium (one
//! browser process per proxy, since Chromium takes its proxy at launch) and a
//! remote browser reached through a DevTools websocket.

use crate::config::CookieConsentConfig;
use crate::navigation::traits::{classify_status, NavigationBackend, NavigationError, NavigationOptions};
use crate::navigation::{PageDocument, PageResult};
use crate::proxy::ProxyDescriptor;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

const STATUS_SCRIPT: &str = r#"
    (function() {
        const entry = performance.getEntriesByType('navigation')[0];
        return entry && entry.responseStatus ? entry.responseStatus : 0;
    })()
"#;

const CONSENT_BUTTONS: &str = "button, [role=button], input[type=submit], a";

/// How the browser is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserMode {
    /// Launch a local Chromium per proxy
    Launch,

    /// Attach to an already running browser
    Remote { url: String },
}

struct BrowserHandle {
    browser: Browser,
    events: JoinHandle<()>,
}

/// Browser-rendering navigation backend
pub struct BrowserBackend {
    mode: BrowserMode,
    browsers: Mutex<HashMap<Option<String>, BrowserHandle>>,
    consent_done: StdMutex<HashSet<String>>,
}

impl BrowserBackend {
    pub fn launch() -> Self {
        Self::with_mode(BrowserMode::Launch)
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::with_mode(BrowserMode::Remote { url: url.into() })
    }

    fn with_mode(mode: BrowserMode) -> Self {
        Self {
            mode,
            browsers: Mutex::new(HashMap::new()),
            consent_done: StdMutex::new(HashSet::new()),
        }
    }

    pub fn mode(&self) -> &BrowserMode {
        &self.mode
    }

    async fn start_browser(
        &self,
        proxy: Option<&ProxyDescriptor>,
        options: &NavigationOptions,
    ) -> Result<BrowserHandle, NavigationError> {
        let (browser, mut handler) = match &self.mode {
            BrowserMode::Remote { url } => {
                tracing::info!("Connecting to remote browser at {}", url);
                Browser::connect(url.as_str())
                    .await
                    .map_err(|e| NavigationError::Browser(format!("connect failed: {}", e)))?
            }
            BrowserMode::Launch => {
                let mut builder = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(options.timeout)
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage");

                if let Some(descriptor) = proxy {
                    builder = builder.arg(format!("--proxy-server={}", descriptor.server));
                    if descriptor.credentials().is_some() {
                        tracing::warn!(
                            "Proxy {} has credentials; launched browsers cannot authenticate to proxies",
                            descriptor
                        );
                    }
                }

                let config = builder.build().map_err(NavigationError::Browser)?;
                tracing::info!(
                    "Launching browser via {}",
                    proxy.map(|p| p.to_string()).unwrap_or_else(|| "direct".to_string())
                );
                Browser::launch(config)
                    .await
                    .map_err(|e| NavigationError::Browser(format!("launch failed: {}", e)))?
            }
        };

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserHandle { browser, events })
    }

    /// Opens a blank page on the browser serving `proxy`
    async fn open_page(
        &self,
        proxy: Option<&ProxyDescriptor>,
        options: &NavigationOptions,
    ) -> Result<Page, NavigationError> {
        let key = match &self.mode {
            BrowserMode::Launch => proxy.map(|p| p.server.clone()),
            BrowserMode::Remote { .. } => {
                if let Some(descriptor) = proxy {
                    tracing::debug!("Remote browser ignores proxy {}", descriptor);
                }
                None
            }
        };

        let mut browsers = self.browsers.lock().await;
        if !browsers.contains_key(&key) {
            let handle = self.start_browser(proxy, options).await?;
            browsers.insert(key.clone(), handle);
        }

        let handle = browsers
            .get(&key)
            .ok_or_else(|| NavigationError::Browser("browser vanished from cache".to_string()))?;

        handle
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| NavigationError::Browser(e.to_string()))
    }

    async fn prepare_page(&self, page: &Page, options: &NavigationOptions) -> Result<(), NavigationError> {
        page.set_user_agent(options.user_agent.as_str())
            .await
            .map_err(|e| NavigationError::Browser(e.to_string()))?;

        let patterns =
            blocked_url_patterns(&options.blocked_resource_types, &options.blocked_domains);
        if !patterns.is_empty() {
            page.execute(EnableParams::default())
                .await
                .map_err(|e| NavigationError::Browser(e.to_string()))?;
            page.execute(SetBlockedUrLsParams::new(patterns))
                .await
                .map_err(|e| NavigationError::Browser(e.to_string()))?;
        }

        Ok(())
    }

    async fn navigate(
        &self,
        page: &Page,
        url: &str,
        options: &NavigationOptions,
    ) -> Result<PageResult, NavigationError> {
        self.prepare_page(page, options).await?;

        page.goto(url).await.map_err(|e| classify_cdp_error(url, e))?;

        if let Some(consent) = &options.cookie_consent {
            self.accept_cookies_once(page, url, consent).await;
        }

        let status = self.response_status(page, url).await;

        let html = page
            .content()
            .await
            .map_err(|e| NavigationError::Browser(e.to_string()))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        classify_status(url, status, Some(html.clone()))?;

        Ok(PageResult::Document(PageDocument {
            url: url.to_string(),
            final_url,
            status,
            html,
        }))
    }

    /// Status of the main document response
    ///
    /// The navigation response tracked by the DevTools handler is
    /// authoritative. The performance API covers engines that did not
    /// surface one.
    async fn response_status(&self, page: &Page, url: &str) -> u16 {
        let navigation = match page.wait_for_navigation_response().await {
            Ok(request) => request
                .and_then(|request| request.response.as_ref().map(|response| response.status)),
            Err(e) => {
                tracing::debug!("No navigation response for {}: {}", url, e);
                None
            }
        };

        let reported = if navigation.is_some() {
            None
        } else {
            page.evaluate(STATUS_SCRIPT)
                .await
                .ok()
                .and_then(|result| result.into_value::<u16>().ok())
        };

        let status = resolve_status(navigation, reported);
        if navigation.is_none() && reported.unwrap_or(0) == 0 {
            tracing::debug!("Browser reported no status for {}; assuming 200", url);
        }
        status
    }

    /// Runs the consent interaction the first time a host is visited
    ///
    /// Failures are logged and leave the host eligible for another try.
    async fn accept_cookies_once(&self, page: &Page, url: &str, consent: &CookieConsentConfig) {
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
            return;
        };

        if self
            .consent_done
            .lock()
            .map(|done| done.contains(&host))
            .unwrap_or(false)
        {
            return;
        }

        match perform_consent(page, consent).await {
            Ok(()) => {
                tracing::debug!("Cookie consent accepted for {}", host);
                if let Ok(mut done) = self.consent_done.lock() {
                    done.insert(host);
                }
            }
            Err(e) => tracing::warn!("Cookie consent on {} failed: {}", host, e),
        }
    }
}

async fn perform_consent(page: &Page, consent: &CookieConsentConfig) -> Result<(), NavigationError> {
    let browser_err = |e: chromiumoxide::error::CdpError| NavigationError::Browser(e.to_string());

    for (name, value) in &consent.fields {
        let field = page
            .find_element(format!("[name=\"{}\"]", name))
            .await
            .map_err(browser_err)?;
        field.click().await.map_err(browser_err)?;
        field.type_str(value).await.map_err(browser_err)?;
    }

    let candidates = page.find_elements(CONSENT_BUTTONS).await.map_err(browser_err)?;
    let mut clicked = false;
    for candidate in candidates {
        let text = candidate.inner_text().await.ok().flatten().unwrap_or_default();
        if text.contains(&consent.button_text) {
            candidate.click().await.map_err(browser_err)?;
            clicked = true;
            break;
        }
    }

    if !clicked {
        return Err(NavigationError::Browser(format!(
            "no button containing '{}'",
            consent.button_text
        )));
    }

    if let Some(marker) = &consent.marker_selector {
        let deadline = Instant::now() + Duration::from_millis(consent.wait_ms);
        loop {
            if page.find_element(marker.as_str()).await.is_ok() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(NavigationError::Browser(format!(
                    "marker '{}' did not appear",
                    marker
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    Ok(())
}

/// Picks the response status from the navigation response, then the
/// performance API, then 200
fn resolve_status(navigation: Option<i64>, reported: Option<u16>) -> u16 {
    if let Some(status) = navigation.and_then(|s| u16::try_from(s).ok()).filter(|s| *s > 0) {
        return status;
    }
    match reported {
        Some(status) if status > 0 => status,
        _ => 200,
    }
}

/// Network failures reported by the browser are transient; the rest are browser faults
fn classify_cdp_error(url: &str, err: chromiumoxide::error::CdpError) -> NavigationError {
    let message = err.to_string();
    if message.contains("net::ERR_") || message.to_lowercase().contains("timeout") {
        NavigationError::Transient {
            url: url.to_string(),
            message,
        }
    } else {
        NavigationError::Browser(message)
    }
}

/// URL patterns for `Network.setBlockedURLs`
pub fn blocked_url_patterns(resource_types: &[String], domains: &[String]) -> Vec<String> {
    let mut patterns = Vec::new();

    for resource_type in resource_types {
        let extensions: &[&str] = match resource_type.to_lowercase().as_str() {
            "image" => &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico"],
            "font" => &["woff", "woff2", "ttf", "otf"],
            "stylesheet" => &["css"],
            "media" => &["mp4", "webm", "mp3", "ogg"],
            "script" => &["js"],
            other => {
                tracing::warn!("Unknown blocked resource type '{}'", other);
                &[]
            }
        };
        patterns.extend(extensions.iter().map(|ext| format!("*.{}", ext)));
    }

    for domain in domains {
        patterns.push(format!("*://{}/*", domain));
        patterns.push(format!("*://*.{}/*", domain));
    }

    patterns
}

#[async_trait]
impl NavigationBackend for BrowserBackend {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyDescriptor>,
        options: &NavigationOptions,
    ) -> Result<PageResult, NavigationError> {
        let page = self.open_page(proxy, options).await?;

        let result = tokio::time::timeout(options.timeout, self.navigate(&page, url, options))
            .await
            .unwrap_or_else(|_| {
                Err(NavigationError::Timeout {
                    url: url.to_string(),
                    after: options.timeout,
                })
            });

        if let Err(e) = page.close().await {
            tracing::debug!("Closing page for {} failed: {}", url, e);
        }

        result
    }

    fn name(&self) -> &'static str {
        match self.mode {
            BrowserMode::Launch => "chromium",
            BrowserMode::Remote { .. } => "remote-browser",
        }
    }

    async fn shutdown(&self) {
        let mut browsers = self.browsers.lock().await;
        for (_, mut handle) in browsers.drain() {
            if matches!(self.mode, BrowserMode::Launch) {
                if let Err(e) = handle.browser.close().await {
                    tracing::debug!("Browser close failed: {}", e);
                }
            }
            handle.events.abort();
        }
    }
}
