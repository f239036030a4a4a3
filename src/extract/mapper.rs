use crate::extract::entity::{Entity, FieldValue};
use crate::extract::schema::{DiscoveryRule, FetchContext, FieldResolver, Schema};
use crate::extract::selector::{resolve_link, select_text, select_values, strip_patterns};
use crate::extract::ExtractError;
use scraper::Html;
use serde_json::Value;
use url::Url;

/// Resolves every schema entry against one fetched page
///
/// Fields are resolved in schema order. Unset fields keep their empty
/// default. Nothing is persisted here; the returned entity is complete.
///
/// # Returns
///
/// * `Ok(Entity)` - The mapped entity, keyed by the record url
/// * `Err(ExtractError)` - A configuration problem or a failing callback
pub fn map_entity(schema: &Schema, ctx: &FetchContext<'_>) -> Result<Entity, ExtractError> {
    let mut entity = Entity::new(ctx.url);

    for (name, resolver) in schema.entries() {
        let value = match resolver {
            FieldResolver::Unset => continue,
            FieldResolver::Literal(literal) => match ctx.page.json() {
                Some(payload) => json_field_value(lookup_path(payload, literal)),
                None => FieldValue::Text(literal.clone()),
            },
            FieldResolver::Callback(callback) => {
                callback(ctx).map_err(|message| ExtractError::Callback {
                    field: name.clone(),
                    message,
                })?
            }
            FieldResolver::SingleSelector(rule) => {
                let document = require_document(ctx, name, resolver)?;
                let text = select_text(document, &rule.query)?;
                FieldValue::Text(strip_patterns(&text, &rule.strip))
            }
            FieldResolver::MultiSelector(rule) => {
                let document = require_document(ctx, name, resolver)?;
                let base = base_url(ctx);
                FieldValue::List(select_values(document, rule, base.as_ref())?)
            }
        };

        entity.set_field(name, value)?;
    }

    Ok(entity)
}

/// Returns the child URLs a discovery rule yields for one page
pub fn discover_links(rule: &DiscoveryRule, ctx: &FetchContext<'_>) -> Result<Vec<String>, ExtractError> {
    match rule {
        DiscoveryRule::Selectors(selectors) => {
            let document = ctx.document.ok_or_else(|| ExtractError::UnsupportedResolver {
                field: "links".to_string(),
                kind: "multi-selector",
                backend: ctx.page.kind(),
            })?;
            let base = base_url(ctx);
            select_values(document, selectors, base.as_ref())
        }
        DiscoveryRule::Callback(callback) => {
            callback(ctx).map_err(|message| ExtractError::Callback {
                field: "links".to_string(),
                message,
            })
        }
    }
}

/// Absolute url of the "next page" link, if the page has one
pub fn next_page_link(
    document: &Html,
    query: &str,
    base: &Url,
) -> Result<Option<String>, ExtractError> {
    let selector = crate::extract::selector::compile(query)?;
    Ok(document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .find_map(|href| resolve_link(href, base)))
}

fn require_document<'a>(
    ctx: &FetchContext<'a>,
    field: &str,
    resolver: &FieldResolver,
) -> Result<&'a Html, ExtractError> {
    ctx.document.ok_or_else(|| ExtractError::UnsupportedResolver {
        field: field.to_string(),
        kind: resolver.kind(),
        backend: ctx.page.kind(),
    })
}

fn base_url(ctx: &FetchContext<'_>) -> Option<Url> {
    Url::parse(ctx.final_url())
        .or_else(|_| Url::parse(ctx.url))
        .ok()
}

/// Follows a dotted path (`offers.0.price`) through objects and arrays
pub fn lookup_path<'v>(payload: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(payload, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn json_field_value(value: Option<&Value>) -> FieldValue {
    match value {
        None | Some(Value::Null) => FieldValue::Text(String::new()),
        Some(Value::String(s)) => FieldValue::Text(s.clone()),
        Some(Value::Array(items)) => FieldValue::List(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
        Some(other) => FieldValue::Text(other.to_string()),
    }
}
