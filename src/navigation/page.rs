//! Normalized page results shared by every backend

use scraper::Html;
use serde_json::Value;

/// A rendered or downloaded markup page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    /// Url that was requested
    pub url: String,

    /// Url after redirects
    pub final_url: String,

    pub status: u16,
    pub html: String,
}

impl PageDocument {
    /// Parses the markup
    ///
    /// `Html` is not `Send`; parse inside synchronous code and drop it before
    /// the next await point.
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// A decoded JSON response
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPayload {
    pub url: String,
    pub status: u16,
    pub value: Value,

    /// Body as received, kept for diagnostic snapshots
    pub raw: String,
}

/// What a navigation backend hands back on success
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    Document(PageDocument),
    Json(JsonPayload),
}

impl PageResult {
    pub fn url(&self) -> &str {
        match self {
            Self::Document(doc) => &doc.url,
            Self::Json(payload) => &payload.url,
        }
    }

    pub fn final_url(&self) -> &str {
        match self {
            Self::Document(doc) => &doc.final_url,
            Self::Json(payload) => &payload.url,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Document(doc) => doc.status,
            Self::Json(payload) => payload.status,
        }
    }

    /// Raw content for snapshots
    pub fn body(&self) -> &str {
        match self {
            Self::Document(doc) => &doc.html,
            Self::Json(payload) => &payload.raw,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Document(_) => "document",
            Self::Json(_) => "json",
        }
    }

    pub fn as_document(&self) -> Option<&PageDocument> {
        match self {
            Self::Document(doc) => Some(doc),
            Self::Json(_) => None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(payload) => Some(&payload.value),
            Self::Document(_) => None,
        }
    }
}
