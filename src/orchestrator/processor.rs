use crate::config::BackendKind;
use crate::extract::{is_known_field, DiscoveryRule, ExtractError, Schema};
use crate::proxy::ProxyStrategy;
use std::time::Duration;

/// What a processor does with each fetched page
#[derive(Debug, Clone)]
pub enum ProcessorMode {
    /// Finds child URLs and hands them back for bulk enqueue
    Discovery {
        rule: DiscoveryRule,
        /// Selector of the "next page" link of a paginated listing
        next_page: Option<String>,
        max_pages: usize,
    },
    /// Maps the page into an entity and runs the completion pipeline
    Detail {
        schema: Schema,
        required_fields: Vec<String>,
        validation_retryable: bool,
    },
}

/// One stage of a site: binds a source frontier collection to a destination
///
/// Discovery processors write child URLs into the destination frontier
/// collection; detail processors write entities into the destination entity
/// collection. Unset overrides fall back to the engine-wide settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub name: String,
    pub site: String,
    pub source: String,
    pub destination: String,
    pub mode: ProcessorMode,

    pub concurrency_limit: Option<usize>,
    pub proxy_strategy: Option<ProxyStrategy>,
    pub timeout: Option<Duration>,
    pub backend: Option<BackendKind>,

    /// Persist entities but leave the source record pending
    pub skip_completion: bool,
    /// Keep every entity instead of replacing by url
    pub allow_duplicates: bool,
}

impl ProcessorConfig {
    fn with_mode(
        name: impl Into<String>,
        site: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        mode: ProcessorMode,
    ) -> Self {
        Self {
            name: name.into(),
            site: site.into(),
            source: source.into(),
            destination: destination.into(),
            mode,
            concurrency_limit: None,
            proxy_strategy: None,
            timeout: None,
            backend: None,
            skip_completion: false,
            allow_duplicates: false,
        }
    }

    pub fn discovery(
        name: impl Into<String>,
        site: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        rule: impl Into<DiscoveryRule>,
    ) -> Self {
        Self::with_mode(
            name,
            site,
            source,
            destination,
            ProcessorMode::Discovery {
                rule: rule.into(),
                next_page: None,
                max_pages: 1,
            },
        )
    }

    pub fn detail(
        name: impl Into<String>,
        site: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        schema: Schema,
    ) -> Self {
        Self::with_mode(
            name,
            site,
            source,
            destination,
            ProcessorMode::Detail {
                schema,
                required_fields: Vec::new(),
                validation_retryable: true,
            },
        )
    }

    /// Follows "next page" links up to `max_pages` pages per record (discovery only)
    pub fn paginate(mut self, query: impl Into<String>, max_pages: usize) -> Self {
        if let ProcessorMode::Discovery {
            next_page,
            max_pages: limit,
            ..
        } = &mut self.mode
        {
            *next_page = Some(query.into());
            *limit = max_pages.max(1);
        }
        self
    }

    pub fn required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ProcessorMode::Detail {
            required_fields, ..
        } = &mut self.mode
        {
            *required_fields = fields.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn validation_retryable(mut self, retryable: bool) -> Self {
        if let ProcessorMode::Detail {
            validation_retryable,
            ..
        } = &mut self.mode
        {
            *validation_retryable = retryable;
        }
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn proxy_strategy(mut self, strategy: ProxyStrategy) -> Self {
        self.proxy_strategy = Some(strategy);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn skip_completion(mut self, skip: bool) -> Self {
        self.skip_completion = skip;
        self
    }

    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn is_discovery(&self) -> bool {
        matches!(self.mode, ProcessorMode::Discovery { .. })
    }

    /// Rejects schemas and required-field lists naming unknown entity fields
    pub fn validate(&self) -> Result<(), ExtractError> {
        if let ProcessorMode::Detail {
            schema,
            required_fields,
            ..
        } = &self.mode
        {
            schema.validate()?;
            if let Some(unknown) = required_fields.iter().find(|f| !is_known_field(f)) {
                return Err(ExtractError::UnknownField(unknown.clone()));
            }
        }
        Ok(())
    }
}
