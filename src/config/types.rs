use crate::proxy::{ProxyDescriptor, ProxyStrategy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub submission: Option<SubmissionConfig>,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Deployment environment; controls the item cap and downstream submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Orchestration behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Attempts after which a URL is no longer eligible for a batch
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Maximum records fetched from the frontier per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent workers per proxy
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Items processed per run outside production (unbounded when absent)
    #[serde(default)]
    pub dev_item_cap: Option<usize>,

    /// Treat every validation failure as terminal
    #[serde(default)]
    pub ignore_retry_on_validation: bool,

    /// Deadline for a single frontier store call (milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl EngineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// The item cap applies only to development and staging runs
    pub fn effective_item_cap(&self) -> Option<usize> {
        if self.environment.is_production() {
            None
        } else {
            self.dev_item_cap
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            max_retry_attempts: default_max_retry_attempts(),
            batch_size: default_batch_size(),
            concurrency_limit: default_concurrency_limit(),
            dev_item_cap: None,
            ignore_retry_on_validation: false,
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Request pacing applied by every worker
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Pause after every N requests (0 disables)
    #[serde(default)]
    pub sleep_every: u64,

    /// Length of that pause (milliseconds)
    #[serde(default)]
    pub sleep_ms: u64,

    /// Upper bound of a random per-request sleep (milliseconds, 0 disables)
    #[serde(default)]
    pub jitter_ms: u64,
}

/// Proxy pool and allocation strategy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    #[serde(default)]
    pub strategy: ProxyStrategy,

    /// Sleep before retrying on a freshly rotated proxy (milliseconds)
    #[serde(default)]
    pub rotation_cooldown_ms: u64,

    #[serde(default)]
    pub servers: Vec<ProxyDescriptor>,
}

/// Which navigation backend fetches pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Http,
    Chromium,
    RemoteBrowser,
    JsonApi,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Chromium => "chromium",
            Self::RemoteBrowser => "remote-browser",
            Self::JsonApi => "json-api",
        }
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, Self::Chromium | Self::RemoteBrowser)
    }
}

/// Navigation backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NavigationConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Per-navigation deadline (milliseconds)
    #[serde(default = "default_navigation_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Resource types skipped by browser backends (image, font, stylesheet, media, script)
    #[serde(default)]
    pub blocked_resource_types: Vec<String>,

    /// Domains whose requests are skipped by browser backends
    #[serde(default)]
    pub blocked_domains: Vec<String>,

    /// DevTools websocket endpoint for the remote browser backend
    #[serde(default)]
    pub remote_debugging_url: Option<String>,

    #[serde(default)]
    pub cookie_consent: Option<CookieConsentConfig>,
}

impl NavigationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timeout_ms: default_navigation_timeout_ms(),
            user_agent: default_user_agent(),
            blocked_resource_types: Vec::new(),
            blocked_domains: Vec::new(),
            remote_debugging_url: None,
            cookie_consent: None,
        }
    }
}

/// One-shot cookie-consent interaction performed by browser backends
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CookieConsentConfig {
    /// Form fields to fill, keyed by their `name` attribute
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Text contained in the button to click
    pub button_text: String,

    /// Element that appears once consent has been given
    #[serde(default)]
    pub marker_selector: Option<String>,

    #[serde(default = "default_consent_wait_ms")]
    pub wait_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite frontier database
    pub database_path: String,

    /// Root directory for diagnostic page snapshots
    #[serde(default)]
    pub snapshot_dir: Option<String>,

    /// Directory for bulk exports
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    #[serde(default = "default_export_page_size")]
    pub export_page_size: usize,
}

/// Downstream submission API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubmissionConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

/// A target site with its seeds and ordered processors
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteEntry {
    pub name: String,

    #[serde(default)]
    pub seeds: Vec<String>,

    /// Collection holding the seeds (defaults to `<name>_seeds`)
    #[serde(default)]
    pub root_collection: Option<String>,

    #[serde(default, rename = "processor")]
    pub processors: Vec<ProcessorEntry>,
}

impl SiteEntry {
    pub fn root_collection(&self) -> String {
        self.root_collection
            .clone()
            .unwrap_or_else(|| format!("{}_seeds", self.name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    Discovery,
    Detail,
}

/// Declarative processor definition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessorEntry {
    pub name: String,
    pub kind: ProcessorKind,
    pub source: String,
    pub destination: String,

    /// Discovery: ordered (query, attribute) pairs yielding child URLs
    #[serde(default)]
    pub links: Vec<(String, String)>,

    #[serde(default = "default_true")]
    pub unique: bool,

    /// Discovery: substrings that exclude a candidate link
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Discovery: selector of the "next page" link for paginated listings
    #[serde(default)]
    pub next_page: Option<String>,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Detail: entity field name -> resolver rule
    #[serde(default)]
    pub fields: BTreeMap<String, FieldEntry>,

    #[serde(default)]
    pub required_fields: Vec<String>,

    #[serde(default = "default_true")]
    pub validation_retryable: bool,

    #[serde(default)]
    pub skip_completion: bool,

    #[serde(default)]
    pub allow_duplicates: bool,

    #[serde(default)]
    pub concurrency_limit: Option<usize>,

    #[serde(default)]
    pub proxy_strategy: Option<ProxyStrategy>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub backend: Option<BackendKind>,
}

/// Declarative field rule; exactly one of `literal`, `selector`, `selectors`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldEntry {
    #[serde(default)]
    pub literal: Option<String>,

    #[serde(default)]
    pub selector: Option<String>,

    /// Regex patterns removed, in order, from a single-selector result
    #[serde(default)]
    pub strip: Vec<String>,

    #[serde(default)]
    pub selectors: Vec<(String, String)>,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_batch_size() -> usize {
    1000
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; harvester/1.0)".to_string()
}

fn default_consent_wait_ms() -> u64 {
    5_000
}

fn default_export_dir() -> String {
    "./exports".to_string()
}

fn default_export_page_size() -> usize {
    500
}

fn default_max_pages() -> usize {
    50
}

fn default_true() -> bool {
    true
}
