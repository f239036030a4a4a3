//! Field resolvers and the ordered entity schema

use crate::extract::entity::{is_known_field, FieldValue};
use crate::extract::ExtractError;
use crate::frontier::UrlRecord;
use crate::navigation::PageResult;
use regex::Regex;
use scraper::Html;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Callback resolving one field from the fetch context
pub type FieldCallback =
    Arc<dyn Fn(&FetchContext<'_>) -> Result<FieldValue, String> + Send + Sync>;

/// Callback returning child URLs for a discovery processor
pub type DiscoveryCallback =
    Arc<dyn Fn(&FetchContext<'_>) -> Result<Vec<String>, String> + Send + Sync>;

/// Everything a resolver may look at for one fetched page
pub struct FetchContext<'a> {
    /// Frontier url of the record being processed
    pub url: &'a str,
    pub record: &'a UrlRecord,
    pub page: &'a PageResult,

    /// Parsed document, present for markup pages only
    pub document: Option<&'a Html>,

    reported_page: RefCell<Option<String>>,
}

impl<'a> FetchContext<'a> {
    pub fn new(record: &'a UrlRecord, page: &'a PageResult, document: Option<&'a Html>) -> Self {
        Self {
            url: &record.url,
            record,
            page,
            document,
            reported_page: RefCell::new(None),
        }
    }

    /// Url the page was finally served from, after redirects
    pub fn final_url(&self) -> &str {
        self.page.final_url()
    }

    /// Resume point stored by an earlier attempt
    pub fn resume_page(&self) -> Option<&str> {
        self.record.current_page_url.as_deref()
    }

    /// Reports a sub-page url; the worker persists it as the resume point
    pub fn report_page(&self, page_url: impl Into<String>) {
        *self.reported_page.borrow_mut() = Some(page_url.into());
    }

    pub fn take_reported_page(&self) -> Option<String> {
        self.reported_page.borrow_mut().take()
    }
}

/// One query plus an ordered list of regex patterns removed from its text
///
/// Patterns are compiled when the selector is built, never per page.
#[derive(Debug, Clone)]
pub struct SingleSelector {
    pub query: String,
    pub strip: Vec<Regex>,
}

impl SingleSelector {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            strip: Vec::new(),
        }
    }

    pub fn strip(mut self, pattern: Regex) -> Self {
        self.strip.push(pattern);
        self
    }

    /// Compiles `pattern` and appends it
    pub fn try_strip(self, pattern: &str) -> Result<Self, ExtractError> {
        Ok(self.strip(Regex::new(pattern)?))
    }
}

/// Ordered (query, attribute) pairs
///
/// The attribute `text` takes the element's text content; `href` and `src`
/// values are resolved against the page url.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiSelector {
    pub selectors: Vec<(String, String)>,
    pub unique: bool,
    pub exclude: Vec<String>,
}

impl MultiSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, query: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.selectors.push((query.into(), attribute.into()));
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn exclude(mut self, substring: impl Into<String>) -> Self {
        self.exclude.push(substring.into());
        self
    }
}

/// How one entity field is resolved
#[derive(Clone)]
pub enum FieldResolver {
    Unset,

    /// A fixed string; for JSON pages, a dotted path into the payload
    Literal(String),

    Callback(FieldCallback),
    SingleSelector(SingleSelector),
    MultiSelector(MultiSelector),
}

impl FieldResolver {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&FetchContext<'_>) -> Result<FieldValue, String> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Literal(_) => "literal",
            Self::Callback(_) => "callback",
            Self::SingleSelector(_) => "single-selector",
            Self::MultiSelector(_) => "multi-selector",
        }
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "Unset"),
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Callback(_) => write!(f, "Callback(..)"),
            Self::SingleSelector(s) => f.debug_tuple("SingleSelector").field(s).finish(),
            Self::MultiSelector(m) => f.debug_tuple("MultiSelector").field(m).finish(),
        }
    }
}

impl From<SingleSelector> for FieldResolver {
    fn from(s: SingleSelector) -> Self {
        Self::SingleSelector(s)
    }
}

impl From<MultiSelector> for FieldResolver {
    fn from(m: MultiSelector) -> Self {
        Self::MultiSelector(m)
    }
}

/// Ordered (field name, resolver) pairs, resolved front to back
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<(String, FieldResolver)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field; a later entry for the same name replaces the earlier one in place
    pub fn field(mut self, name: impl Into<String>, resolver: impl Into<FieldResolver>) -> Self {
        let name = name.into();
        let resolver = resolver.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = resolver,
            None => self.entries.push((name, resolver)),
        }
        self
    }

    pub fn entries(&self) -> &[(String, FieldResolver)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rejects entries naming fields the entity does not have
    pub fn validate(&self) -> Result<(), ExtractError> {
        for (name, _) in &self.entries {
            if !is_known_field(name) {
                return Err(ExtractError::UnknownField(name.clone()));
            }
        }
        Ok(())
    }
}

/// How a discovery processor finds child URLs
#[derive(Clone)]
pub enum DiscoveryRule {
    Selectors(MultiSelector),
    Callback(DiscoveryCallback),
}

impl DiscoveryRule {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&FetchContext<'_>) -> Result<Vec<String>, String> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }
}

impl fmt::Debug for DiscoveryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selectors(m) => f.debug_tuple("Selectors").field(m).finish(),
            Self::Callback(_) => write!(f, "Callback(..)"),
        }
    }
}

impl From<MultiSelector> for DiscoveryRule {
    fn from(m: MultiSelector) -> Self {
        Self::Selectors(m)
    }
}
