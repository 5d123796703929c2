//! Conversion of untrusted raw items into `ContentItem`s.
//!
//! This is the single place where loosely shaped input becomes the trusted
//! item type. It never rejects anything; the validator runs again on the
//! output.

use super::rules::scalar_text;
use super::{OBJECT_ID_PATTERN, SLUG_PATTERN};
use crate::core::{ContentItem, Keyword};
use serde_json::{Map, Value};
use uuid::Uuid;

/// How a user-facing field treats values shaped like internal object ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectIdPolicy {
    /// Replace with a generated placeholder.
    Redact,
    /// The value is treated as invalid and regenerated.
    Regenerate,
    /// Object ids are legitimate values for this field.
    Allow,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldPolicy {
    pub field: &'static str,
    pub object_ids: ObjectIdPolicy,
}

/// Sanitization rule table. Fields not listed are dropped.
pub const FIELD_POLICIES: &[FieldPolicy] = &[
    FieldPolicy {
        field: "title",
        object_ids: ObjectIdPolicy::Redact,
    },
    FieldPolicy {
        field: "slug",
        object_ids: ObjectIdPolicy::Regenerate,
    },
    FieldPolicy {
        field: "description",
        object_ids: ObjectIdPolicy::Redact,
    },
    FieldPolicy {
        field: "keywords",
        object_ids: ObjectIdPolicy::Redact,
    },
    FieldPolicy {
        field: "linkedRecord",
        object_ids: ObjectIdPolicy::Allow,
    },
    FieldPolicy {
        field: "publishedAt",
        object_ids: ObjectIdPolicy::Redact,
    },
];

pub fn policy_for(field: &str) -> ObjectIdPolicy {
    FIELD_POLICIES
        .iter()
        .find(|policy| policy.field == field)
        .map(|policy| policy.object_ids)
        .unwrap_or(ObjectIdPolicy::Redact)
}

pub fn looks_like_object_id(value: &str) -> bool {
    OBJECT_ID_PATTERN.is_match(value.trim())
}

fn placeholder() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("redacted-{}", &id[..8])
}

/// Applies the object-id policy of `field` to a text value.
fn neutralize(field: &str, text: String) -> Option<String> {
    if !looks_like_object_id(&text) {
        return Some(text);
    }
    match policy_for(field) {
        ObjectIdPolicy::Allow => Some(text),
        ObjectIdPolicy::Redact => Some(placeholder()),
        ObjectIdPolicy::Regenerate => None,
    }
}

const MAX_GENERATED_SLUG_CHARS: usize = 100;

/// Builds a URL slug from free text: lowercase ASCII alphanumerics joined by single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug.truncate(MAX_GENERATED_SLUG_CHARS);
    slug.trim_end_matches('-').to_string()
}

fn text_field(item: &Map<String, Value>, field: &str) -> Option<String> {
    let text = item.get(field).and_then(scalar_text)?;
    neutralize(field, text)
}

fn sanitize_keywords(value: Option<&Value>) -> Vec<Keyword> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            // Only the value survives; ids or other keys on keyword objects are dropped.
            Value::Object(map) => map.get("value").and_then(scalar_text),
            other => scalar_text(other),
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .filter_map(|text| neutralize("keywords", text))
        .map(Keyword::new)
        .collect()
}

fn sanitize_approved(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        Some(Value::Number(number)) => number.as_i64() == Some(1),
        _ => false,
    }
}

fn sanitize_linked_record(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(map) => ["id", "_id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(scalar_text)),
        other => scalar_text(other),
    }
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .and_then(|id| neutralize("linkedRecord", id))
}

/// Produces a trusted item from one raw input at `index`.
pub fn sanitize_item(index: usize, raw: &Value) -> ContentItem {
    let empty = Map::new();
    let item = raw.as_object().unwrap_or(&empty);

    let title = text_field(item, "title")
        .map(|title| title.trim().to_string())
        .unwrap_or_default();

    let slug = item
        .get("slug")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|slug| SLUG_PATTERN.is_match(slug) && slug.len() <= 255)
        .and_then(|slug| neutralize("slug", slug.to_string()))
        .unwrap_or_else(|| {
            let generated = slugify(&title);
            if generated.is_empty() {
                format!("item-{}", index + 1)
            } else {
                generated
            }
        });

    ContentItem {
        title,
        slug,
        description: text_field(item, "description"),
        keywords: sanitize_keywords(item.get("keywords")),
        approved: sanitize_approved(item.get("approved")),
        linked_record: sanitize_linked_record(item.get("linkedRecord")),
        published_at: text_field(item, "publishedAt").map(|raw| raw.trim().to_string()),
    }
}
