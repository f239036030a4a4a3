//! Extraction mapper
//!
//! A [`Schema`] is an ordered list of `(field name, resolver)` pairs. Each
//! resolver is one of a closed set of variants (unset, literal, callback,
//! single selector, multi selector) and is dispatched explicitly, so no
//! runtime type inspection is involved.

mod entity;
mod mapper;
mod schema;
mod selector;

pub use entity::{
    field_kind, field_position, is_known_field, AttributeItem, Entity, FieldKind, FieldValue,
    ENTITY_FIELDS,
};
pub use mapper::{discover_links, lookup_path, map_entity, next_page_link};
pub use schema::{
    DiscoveryCallback, DiscoveryRule, FetchContext, FieldCallback, FieldResolver, MultiSelector,
    Schema, SingleSelector,
};
pub use selector::{resolve_link, select_text, select_values, strip_patterns};

use thiserror::Error;

/// Errors raised while mapping a page into an entity
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unknown entity field '{0}'")]
    UnknownField(String),

    #[error("Field '{field}': {kind} resolver is not supported on {backend} pages")]
    UnsupportedResolver {
        field: String,
        kind: &'static str,
        backend: &'static str,
    },

    #[error("Field '{field}' expects {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Invalid selector '{query}': {message}")]
    InvalidSelector { query: String, message: String },

    #[error("Invalid strip pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Callback for '{field}' failed: {message}")]
    Callback { field: String, message: String },
}

impl ExtractError {
    /// Everything except a failing callback is a schema problem that no retry can fix
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Callback { .. })
    }
}
