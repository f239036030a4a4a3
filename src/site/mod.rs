//! Site definitions
//!
//! Turns declarative `[[site]]` blocks into seeds plus an ordered list of
//! [`ProcessorConfig`]s. Rust callers can also build a [`SiteDefinition`]
//! directly to register callback resolvers.

use crate::config::{Config, FieldEntry, ProcessorEntry, ProcessorKind, SiteEntry};
use crate::extract::{field_position, FieldResolver, MultiSelector, Schema, SingleSelector};
use crate::orchestrator::ProcessorConfig;
use crate::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A target site: seeds for its root collection and the processors run in order
#[derive(Debug, Clone)]
pub struct SiteDefinition {
    pub name: String,
    pub root_collection: String,
    pub seeds: Vec<String>,
    pub processors: Vec<Arc<ProcessorConfig>>,
}

impl SiteDefinition {
    pub fn new(name: impl Into<String>, root_collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_collection: root_collection.into(),
            seeds: Vec::new(),
            processors: Vec::new(),
        }
    }

    pub fn seed(mut self, url: impl Into<String>) -> Self {
        self.seeds.push(url.into());
        self
    }

    pub fn processor(mut self, processor: ProcessorConfig) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Builds a site from its declarative configuration
    pub fn from_entry(entry: &SiteEntry) -> Result<Self, ConfigError> {
        let mut site = Self::new(&entry.name, entry.root_collection());
        site.seeds = entry.seeds.clone();
        for processor in &entry.processors {
            site.processors
                .push(Arc::new(build_processor(&entry.name, processor)?));
        }
        Ok(site)
    }
}

/// Builds the sites to run, optionally restricted to one name
pub fn select_sites(config: &Config, only: Option<&str>) -> Result<Vec<SiteDefinition>, ConfigError> {
    let sites: Vec<SiteDefinition> = config
        .sites
        .iter()
        .filter(|site| only.map_or(true, |name| site.name == name))
        .map(SiteDefinition::from_entry)
        .collect::<Result<_, _>>()?;

    if let Some(name) = only {
        if sites.is_empty() {
            return Err(ConfigError::Validation(format!("No site named '{}'", name)));
        }
    }
    Ok(sites)
}

/// Converts one `[[site.processor]]` block
pub fn build_processor(site: &str, entry: &ProcessorEntry) -> Result<ProcessorConfig, ConfigError> {
    let mut processor = match entry.kind {
        ProcessorKind::Discovery => {
            let selectors = multi_selector(&entry.links, entry.unique, &entry.exclude);
            let processor = ProcessorConfig::discovery(
                &entry.name,
                site,
                &entry.source,
                &entry.destination,
                selectors,
            );
            match &entry.next_page {
                Some(query) => processor.paginate(query, entry.max_pages),
                None => processor,
            }
        }
        ProcessorKind::Detail => ProcessorConfig::detail(
            &entry.name,
            site,
            &entry.source,
            &entry.destination,
            build_schema(&entry.fields)?,
        )
        .required_fields(entry.required_fields.iter().cloned())
        .validation_retryable(entry.validation_retryable),
    };

    processor.concurrency_limit = entry.concurrency_limit;
    processor.proxy_strategy = entry.proxy_strategy;
    processor.timeout = entry.timeout_ms.map(Duration::from_millis);
    processor.backend = entry.backend;
    processor.skip_completion = entry.skip_completion;
    processor.allow_duplicates = entry.allow_duplicates;

    Ok(processor)
}

/// Builds a schema whose entries follow the canonical entity field order
fn build_schema(fields: &BTreeMap<String, FieldEntry>) -> Result<Schema, ConfigError> {
    let mut ordered: Vec<(&String, &FieldEntry)> = fields.iter().collect();
    ordered.sort_by_key(|(name, _)| field_position(name).unwrap_or(usize::MAX));

    let mut schema = Schema::new();
    for (name, entry) in ordered {
        schema = schema.field(name.as_str(), build_resolver(name, entry)?);
    }
    Ok(schema)
}

fn build_resolver(field: &str, entry: &FieldEntry) -> Result<FieldResolver, ConfigError> {
    if let Some(literal) = &entry.literal {
        return Ok(FieldResolver::literal(literal));
    }

    if let Some(query) = &entry.selector {
        let mut single = SingleSelector::new(query);
        for pattern in &entry.strip {
            let compiled = Regex::new(pattern).map_err(|e| ConfigError::UnsupportedFieldRule {
                field: field.to_string(),
                reason: format!("invalid strip pattern '{}': {}", pattern, e),
            })?;
            single = single.strip(compiled);
        }
        return Ok(single.into());
    }

    if !entry.selectors.is_empty() {
        return Ok(multi_selector(&entry.selectors, entry.unique, &entry.exclude).into());
    }

    Err(ConfigError::UnsupportedFieldRule {
        field: field.to_string(),
        reason: "expected one of literal, selector or selectors".to_string(),
    })
}

fn multi_selector(pairs: &[(String, String)], unique: bool, exclude: &[String]) -> MultiSelector {
    let selectors = pairs
        .iter()
        .fold(MultiSelector::new(), |m, (query, attribute)| m.select(query, attribute))
        .unique(unique);
    exclude.iter().fold(selectors, |m, substring| m.exclude(substring))
}
