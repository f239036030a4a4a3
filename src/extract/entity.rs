//! The extracted entity and its field table

use crate::extract::ExtractError;
use serde::{Deserialize, Serialize};

/// One free-form key/value attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeItem {
    pub key: String,
    pub value: String,
}

impl AttributeItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Shape of an entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
    Attributes,
}

/// A resolved field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Attributes(Vec<AttributeItem>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
            Self::Attributes(items) => items.is_empty(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<AttributeItem>> for FieldValue {
    fn from(items: Vec<AttributeItem>) -> Self {
        Self::Attributes(items)
    }
}

/// Mappable entity fields in canonical order
pub const ENTITY_FIELDS: &[(&str, FieldKind)] = &[
    ("ProductName", FieldKind::Text),
    ("Brand", FieldKind::Text),
    ("Category", FieldKind::Text),
    ("SubCategory", FieldKind::Text),
    ("Description", FieldKind::Text),
    ("Price", FieldKind::Text),
    ("Currency", FieldKind::Text),
    ("Sku", FieldKind::Text),
    ("Gtin", FieldKind::Text),
    ("Manufacturer", FieldKind::Text),
    ("Availability", FieldKind::Text),
    ("CountryOfOrigin", FieldKind::Text),
    ("Language", FieldKind::Text),
    ("ImageUrls", FieldKind::List),
    ("DocumentUrls", FieldKind::List),
    ("Breadcrumbs", FieldKind::List),
    ("Attributes", FieldKind::Attributes),
];

/// Returns true if `name` is a mappable entity field
pub fn is_known_field(name: &str) -> bool {
    field_kind(name).is_some()
}

pub fn field_kind(name: &str) -> Option<FieldKind> {
    ENTITY_FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, kind)| *kind)
}

/// Position of a field in [`ENTITY_FIELDS`]
pub fn field_position(name: &str) -> Option<usize> {
    ENTITY_FIELDS.iter().position(|(field, _)| *field == name)
}

/// One structured record extracted from a page, keyed by its source url
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entity {
    pub url: String,
    pub product_name: String,
    pub brand: String,
    pub category: String,
    pub sub_category: String,
    pub description: String,
    pub price: String,
    pub currency: String,
    pub sku: String,
    pub gtin: String,
    pub manufacturer: String,
    pub availability: String,
    pub country_of_origin: String,
    pub language: String,
    pub image_urls: Vec<String>,
    pub document_urls: Vec<String>,
    pub breadcrumbs: Vec<String>,
    pub attributes: Vec<AttributeItem>,
}

impl Entity {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    fn text_mut(&mut self, name: &str) -> Option<&mut String> {
        let field = match name {
            "ProductName" => &mut self.product_name,
            "Brand" => &mut self.brand,
            "Category" => &mut self.category,
            "SubCategory" => &mut self.sub_category,
            "Description" => &mut self.description,
            "Price" => &mut self.price,
            "Currency" => &mut self.currency,
            "Sku" => &mut self.sku,
            "Gtin" => &mut self.gtin,
            "Manufacturer" => &mut self.manufacturer,
            "Availability" => &mut self.availability,
            "CountryOfOrigin" => &mut self.country_of_origin,
            "Language" => &mut self.language,
            _ => return None,
        };
        Some(field)
    }

    fn list_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        match name {
            "ImageUrls" => Some(&mut self.image_urls),
            "DocumentUrls" => Some(&mut self.document_urls),
            "Breadcrumbs" => Some(&mut self.breadcrumbs),
            _ => None,
        }
    }

    /// Assigns a resolved value to the named field
    ///
    /// Text fed into a list field becomes a one-item list (or an empty list
    /// when blank); a list fed into a text field is joined with `", "`.
    /// Attribute pairs only fit the `Attributes` field.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), ExtractError> {
        let kind = field_kind(name).ok_or_else(|| ExtractError::UnknownField(name.to_string()))?;

        match (kind, value) {
            (FieldKind::Text, FieldValue::Text(text)) => {
                if let Some(field) = self.text_mut(name) {
                    *field = text;
                }
            }
            (FieldKind::Text, FieldValue::List(items)) => {
                if let Some(field) = self.text_mut(name) {
                    *field = items.join(", ");
                }
            }
            (FieldKind::List, FieldValue::List(items)) => {
                if let Some(field) = self.list_mut(name) {
                    *field = items;
                }
            }
            (FieldKind::List, FieldValue::Text(text)) => {
                if let Some(field) = self.list_mut(name) {
                    *field = if text.trim().is_empty() {
                        Vec::new()
                    } else {
                        vec![text]
                    };
                }
            }
            (FieldKind::Attributes, FieldValue::Attributes(items)) => {
                self.attributes = items;
            }
            (FieldKind::Attributes, _) => {
                return Err(ExtractError::TypeMismatch {
                    field: name.to_string(),
                    expected: "attribute pairs",
                })
            }
            (_, FieldValue::Attributes(_)) => {
                return Err(ExtractError::TypeMismatch {
                    field: name.to_string(),
                    expected: "text or a list of strings",
                })
            }
        }

        Ok(())
    }

    /// Returns true if the named field holds no usable value
    pub fn is_field_empty(&self, name: &str) -> Result<bool, ExtractError> {
        let empty = match name {
            "ImageUrls" => self.image_urls.iter().all(|s| s.trim().is_empty()),
            "DocumentUrls" => self.document_urls.iter().all(|s| s.trim().is_empty()),
            "Breadcrumbs" => self.breadcrumbs.iter().all(|s| s.trim().is_empty()),
            "Attributes" => self.attributes.is_empty(),
            _ => {
                let text = match name {
                    "ProductName" => &self.product_name,
                    "Brand" => &self.brand,
                    "Category" => &self.category,
                    "SubCategory" => &self.sub_category,
                    "Description" => &self.description,
                    "Price" => &self.price,
                    "Currency" => &self.currency,
                    "Sku" => &self.sku,
                    "Gtin" => &self.gtin,
                    "Manufacturer" => &self.manufacturer,
                    "Availability" => &self.availability,
                    "CountryOfOrigin" => &self.country_of_origin,
                    "Language" => &self.language,
                    _ => return Err(ExtractError::UnknownField(name.to_string())),
                };
                text.trim().is_empty()
            }
        };
        Ok(empty)
    }

    /// Column names of the delimited export
    pub fn csv_header() -> Vec<&'static str> {
        std::iter::once("Url")
            .chain(ENTITY_FIELDS.iter().map(|(name, _)| *name))
            .collect()
    }

    /// One export row; list items are joined with `|`, attributes as `key=value`
    pub fn csv_record(&self) -> Vec<String> {
        let attributes = self
            .attributes
            .iter()
            .map(|a| format!("{}={}", a.key, a.value))
            .collect::<Vec<_>>()
            .join("|");

        vec![
            self.url.clone(),
            self.product_name.clone(),
            self.brand.clone(),
            self.category.clone(),
            self.sub_category.clone(),
            self.description.clone(),
            self.price.clone(),
            self.currency.clone(),
            self.sku.clone(),
            self.gtin.clone(),
            self.manufacturer.clone(),
            self.availability.clone(),
            self.country_of_origin.clone(),
            self.language.clone(),
            self.image_urls.join("|"),
            self.document_urls.join("|"),
            self.breadcrumbs.join("|"),
            attributes,
        ]
    }
}
