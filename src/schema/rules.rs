//! Per-field validation rules.
//!
//! Each rule inspects one field of a raw item and records errors or
//! warnings. The validator runs every rule against every item in order.

use super::{OBJECT_ID_PATTERN, SLUG_PATTERN};
use crate::core::ValidationIssue;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const MAX_TITLE_CHARS: usize = 255;
pub const LONG_TITLE_WARNING_CHARS: usize = 120;
pub const MAX_SLUG_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// Fields a caller may never pre-assign.
pub const IDENTITY_FIELDS: &[&str] = &["id", "_id", "persistId", "__v"];

/// Collects issues for one validation pass.
#[derive(Debug, Default)]
pub struct IssueSink {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl IssueSink {
    pub fn error(&mut self, index: usize, field: &str, message: impl Into<String>, value: &Value) {
        self.errors
            .push(ValidationIssue::new(Some(index), field, message, value.clone()));
    }

    pub fn warn(&mut self, index: usize, field: &str, message: impl Into<String>, value: &Value) {
        self.warnings
            .push(ValidationIssue::new(Some(index), field, message, value.clone()));
    }
}

pub trait FieldRule: Send + Sync {
    fn field(&self) -> &'static str;
    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink);
}

/// Renders scalars as text. Objects and arrays are not text.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TitleRule;

impl FieldRule for TitleRule {
    fn field(&self) -> &'static str {
        "title"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        let value = item.get("title").unwrap_or(&Value::Null);
        let Some(title) = scalar_text(value) else {
            if value.is_null() {
                sink.error(index, "title", "Title is required", value);
            } else {
                sink.error(index, "title", "Title must be a string", value);
            }
            return;
        };

        let length = title.trim().chars().count();
        if length == 0 {
            sink.error(index, "title", "Title is required", value);
        } else if length > MAX_TITLE_CHARS {
            sink.error(
                index,
                "title",
                format!("Title must be at most {MAX_TITLE_CHARS} characters"),
                value,
            );
        } else if length > LONG_TITLE_WARNING_CHARS {
            sink.warn(
                index,
                "title",
                format!("Title is unusually long ({length} characters)"),
                value,
            );
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlugRule;

impl FieldRule for SlugRule {
    fn field(&self) -> &'static str {
        "slug"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        let value = item.get("slug").unwrap_or(&Value::Null);
        match value {
            Value::Null => sink.warn(
                index,
                "slug",
                "Slug is missing and will be generated from the title",
                value,
            ),
            Value::String(slug) if slug.is_empty() => sink.warn(
                index,
                "slug",
                "Slug is empty and will be generated from the title",
                value,
            ),
            Value::String(slug) => {
                if slug.chars().count() > MAX_SLUG_CHARS {
                    sink.error(
                        index,
                        "slug",
                        format!("Slug must be at most {MAX_SLUG_CHARS} characters"),
                        value,
                    );
                } else if !SLUG_PATTERN.is_match(slug) {
                    sink.error(
                        index,
                        "slug",
                        "Slug may only contain lowercase letters, digits and hyphens",
                        value,
                    );
                } else if OBJECT_ID_PATTERN.is_match(slug) {
                    sink.warn(
                        index,
                        "slug",
                        "Slug looks like an internal object id and will be regenerated",
                        value,
                    );
                }
            }
            _ => sink.error(index, "slug", "Slug must be a string", value),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescriptionRule;

impl FieldRule for DescriptionRule {
    fn field(&self) -> &'static str {
        "description"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        let Some(value) = item.get("description") else {
            return;
        };
        if value.is_null() {
            return;
        }
        match scalar_text(value) {
            Some(text) if text.chars().count() > MAX_DESCRIPTION_CHARS => sink.error(
                index,
                "description",
                format!("Description must be at most {MAX_DESCRIPTION_CHARS} characters"),
                value,
            ),
            Some(_) => {}
            None => sink.error(index, "description", "Description must be a string", value),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeywordsRule;

impl FieldRule for KeywordsRule {
    fn field(&self) -> &'static str {
        "keywords"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        let Some(value) = item.get("keywords") else {
            return;
        };
        let entries = match value {
            Value::Null => return,
            Value::Array(entries) => entries,
            _ => {
                sink.error(index, "keywords", "Keywords must be a list", value);
                return;
            }
        };

        let mut seen = HashSet::new();
        for entry in entries {
            let text = match entry {
                Value::Object(map) => map.get("value").and_then(scalar_text),
                other => scalar_text(other),
            };
            let Some(text) = text else {
                sink.error(
                    index,
                    "keywords",
                    "Keyword must be a string or an object with a 'value'",
                    entry,
                );
                continue;
            };

            let text = text.trim().to_string();
            if text.is_empty() {
                sink.warn(index, "keywords", "Blank keyword will be dropped", entry);
            } else if !seen.insert(text.clone()) {
                sink.warn(index, "keywords", format!("Duplicate keyword '{text}'"), entry);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApprovedRule;

impl FieldRule for ApprovedRule {
    fn field(&self) -> &'static str {
        "approved"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        match item.get("approved") {
            None | Some(Value::Null) | Some(Value::Bool(_)) => {}
            Some(value) => sink.error(index, "approved", "Approved must be a boolean", value),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkedRecordRule;

impl FieldRule for LinkedRecordRule {
    fn field(&self) -> &'static str {
        "linkedRecord"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        match item.get("linkedRecord") {
            None | Some(Value::Null) => {}
            Some(Value::String(id)) if id.trim().is_empty() => sink.error(
                index,
                "linkedRecord",
                "Linked record id must not be blank",
                &Value::String(id.clone()),
            ),
            Some(Value::String(_)) => {}
            Some(value) => sink.error(
                index,
                "linkedRecord",
                "Linked record must be an opaque identifier, not an embedded object",
                value,
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishedAtRule;

impl FieldRule for PublishedAtRule {
    fn field(&self) -> &'static str {
        "publishedAt"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        match item.get("publishedAt") {
            None | Some(Value::Null) => {}
            Some(Value::String(raw)) => {
                if chrono::DateTime::parse_from_rfc3339(raw.trim()).is_err() {
                    sink.error(
                        index,
                        "publishedAt",
                        "Publication date must be an RFC 3339 timestamp",
                        &Value::String(raw.clone()),
                    );
                }
            }
            Some(value) => sink.error(
                index,
                "publishedAt",
                "Publication date must be a string",
                value,
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityRule;

impl FieldRule for IdentityRule {
    fn field(&self) -> &'static str {
        "id"
    }

    fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
        for field in IDENTITY_FIELDS {
            if let Some(value) = item.get(*field) {
                sink.warn(
                    index,
                    field,
                    "Pre-assigned identity fields are stripped before saving",
                    value,
                );
            }
        }
    }
}

pub fn default_rules() -> Vec<Box<dyn FieldRule>> {
    vec![
        Box::new(IdentityRule),
        Box::new(TitleRule),
        Box::new(SlugRule),
        Box::new(DescriptionRule),
        Box::new(KeywordsRule),
        Box::new(ApprovedRule),
        Box::new(LinkedRecordRule),
        Box::new(PublishedAtRule),
    ]
}
