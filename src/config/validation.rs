use crate::config::types::{
    BackendKind, Config, EngineConfig, FieldEntry, NavigationConfig, OutputConfig, ProcessorEntry,
    ProcessorKind, ProxyConfig, SiteEntry,
};
use crate::extract::is_known_field;
use crate::proxy::ProxyStrategy;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_proxy_config(&config.proxy)?;
    validate_navigation_config(&config.navigation)?;
    validate_output_config(&config.output)?;
    validate_submission(config)?;
    validate_sites(config)?;
    Ok(())
}

/// Rejects rotation strategies over an empty proxy pool
pub fn validate_proxy_strategy(strategy: ProxyStrategy, pool_size: usize) -> Result<(), ConfigError> {
    if strategy.requires_pool() && pool_size == 0 {
        return Err(ConfigError::EmptyProxyPool(strategy.as_str().to_string()));
    }
    Ok(())
}

fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.concurrency_limit < 1 || config.concurrency_limit > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency_limit must be between 1 and 100, got {}",
            config.concurrency_limit
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    if config.max_retry_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_retry_attempts must be >= 1".to_string(),
        ));
    }

    if config.dev_item_cap == Some(0) {
        return Err(ConfigError::Validation(
            "dev_item_cap must be >= 1 when set".to_string(),
        ));
    }

    if config.store_timeout_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "store_timeout_ms must be >= 10ms, got {}ms",
            config.store_timeout_ms
        )));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    validate_proxy_strategy(config.strategy, config.servers.len())?;

    for proxy in &config.servers {
        Url::parse(&proxy.server).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy server '{}': {}", proxy.server, e))
        })?;

        if proxy.username.is_some() != proxy.password.is_some() {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' must set both username and password or neither",
                proxy.server
            )));
        }
    }

    Ok(())
}

fn validate_navigation_config(config: &NavigationConfig) -> Result<(), ConfigError> {
    validate_backend(config, config.backend)?;

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "navigation timeout must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if let Some(consent) = &config.cookie_consent {
        if consent.button_text.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cookie_consent.button_text cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_backend(config: &NavigationConfig, backend: BackendKind) -> Result<(), ConfigError> {
    if backend == BackendKind::RemoteBrowser {
        let url = config.remote_debugging_url.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "remote-browser backend requires navigation.remote_debugging_url".to_string(),
            )
        })?;
        Url::parse(url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid remote_debugging_url '{}': {}", url, e))
        })?;
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.export_page_size < 1 {
        return Err(ConfigError::Validation(
            "export_page_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_submission(config: &Config) -> Result<(), ConfigError> {
    match &config.submission {
        Some(submission) => {
            Url::parse(&submission.endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!(
                    "Invalid submission endpoint '{}': {}",
                    submission.endpoint, e
                ))
            })?;
            Ok(())
        }
        None if config.engine.environment.is_production() => Err(ConfigError::Validation(
            "production runs require a [submission] section".to_string(),
        )),
        None => Ok(()),
    }
}

fn validate_sites(config: &Config) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for site in &config.sites {
        if site.name.is_empty() {
            return Err(ConfigError::Validation(
                "site name cannot be empty".to_string(),
            ));
        }

        if !names.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site name '{}'",
                site.name
            )));
        }

        for seed in &site.seeds {
            Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;
        }

        for processor in &site.processors {
            validate_processor(config, site, processor)?;
        }
    }

    Ok(())
}

fn validate_processor(
    config: &Config,
    site: &SiteEntry,
    processor: &ProcessorEntry,
) -> Result<(), ConfigError> {
    let label = format!("{}/{}", site.name, processor.name);

    if processor.source.is_empty() || processor.destination.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Processor '{}' must name a source and a destination collection",
            label
        )));
    }

    if let Some(limit) = processor.concurrency_limit {
        if limit < 1 || limit > 100 {
            return Err(ConfigError::Validation(format!(
                "Processor '{}' concurrency_limit must be between 1 and 100, got {}",
                label, limit
            )));
        }
    }

    if let Some(strategy) = processor.proxy_strategy {
        validate_proxy_strategy(strategy, config.proxy.servers.len())?;
    }

    if let Some(backend) = processor.backend {
        validate_backend(&config.navigation, backend)?;
    }

    match processor.kind {
        ProcessorKind::Discovery => {
            if processor.links.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Discovery processor '{}' needs at least one entry in links",
                    label
                )));
            }
        }
        ProcessorKind::Detail => {
            for (field, entry) in &processor.fields {
                if !is_known_field(field) {
                    return Err(ConfigError::Validation(format!(
                        "Processor '{}' maps unknown entity field '{}'",
                        label, field
                    )));
                }
                validate_field_entry(field, entry)?;
            }

            for field in &processor.required_fields {
                if !is_known_field(field) {
                    return Err(ConfigError::Validation(format!(
                        "Processor '{}' requires unknown entity field '{}'",
                        label, field
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Exactly one rule kind must be present on a field entry
fn validate_field_entry(field: &str, entry: &FieldEntry) -> Result<(), ConfigError> {
    let kinds = [
        entry.literal.is_some(),
        entry.selector.is_some(),
        !entry.selectors.is_empty(),
    ]
    .iter()
    .filter(|present| **present)
    .count();

    match kinds {
        1 => Ok(()),
        0 => Err(ConfigError::UnsupportedFieldRule {
            field: field.to_string(),
            reason: "expected one of literal, selector or selectors".to_string(),
        }),
        _ => Err(ConfigError::UnsupportedFieldRule {
            field: field.to_string(),
            reason: "literal, selector and selectors are mutually exclusive".to_string(),
        }),
    }
}
