//! DOM query helpers over `scraper`

use crate::extract::schema::MultiSelector;
use crate::extract::ExtractError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Compiles a CSS selector
pub fn compile(query: &str) -> Result<Selector, ExtractError> {
    Selector::parse(query).map_err(|e| ExtractError::InvalidSelector {
        query: query.to_string(),
        message: e.to_string(),
    })
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matching `query`, or an empty string
pub fn select_text(document: &Html, query: &str) -> Result<String, ExtractError> {
    let selector = compile(query)?;
    Ok(document
        .select(&selector)
        .next()
        .map(|element| element_text(&element))
        .unwrap_or_default())
}

/// Removes every pattern, in order, then trims
pub fn strip_patterns(text: &str, patterns: &[Regex]) -> String {
    let mut value = text.to_string();
    for pattern in patterns {
        value = pattern.replace_all(&value, "").into_owned();
    }
    value.trim().to_string()
}

/// Collects values for every (query, attribute) pair in order
///
/// Empty values are dropped. With `unique` set, each value is kept at its
/// first-seen position only. Values containing any `exclude` substring are
/// dropped.
pub fn select_values(
    document: &Html,
    rule: &MultiSelector,
    base_url: Option<&Url>,
) -> Result<Vec<String>, ExtractError> {
    let mut values = Vec::new();
    let mut seen = HashSet::new();

    for (query, attribute) in &rule.selectors {
        let selector = compile(query)?;

        for element in document.select(&selector) {
            let value = match attribute.as_str() {
                "text" => Some(element_text(&element)),
                "href" | "src" => element
                    .value()
                    .attr(attribute)
                    .and_then(|raw| match base_url {
                        Some(base) => resolve_link(raw, base),
                        None => Some(raw.trim().to_string()),
                    }),
                other => element.value().attr(other).map(|raw| raw.trim().to_string()),
            };

            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };

            if rule.exclude.iter().any(|needle| value.contains(needle.as_str())) {
                continue;
            }

            if rule.unique && !seen.insert(value.clone()) {
                continue;
            }

            values.push(value);
        }
    }

    Ok(values)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}
