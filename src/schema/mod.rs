//! Structural validation and sanitization of item batches.
//!
//! Validation never fails with an error: problems come back as
//! `ValidationResult` data. Sanitization is a separate pass that turns raw
//! JSON into `ContentItem`s.

pub mod rules;
pub mod sanitize;

use crate::core::{ContentItem, ValidationIssue, ValidationResult};
use lazy_static::lazy_static;
use regex::Regex;
use rules::{FieldRule, IssueSink, default_rules};
use serde_json::Value;
use std::collections::HashMap;

pub use sanitize::{looks_like_object_id, sanitize_item, slugify};

lazy_static! {
    pub static ref SLUG_PATTERN: Regex = Regex::new(r"^[a-z0-9-]+$").unwrap();
    pub static ref OBJECT_ID_PATTERN: Regex = Regex::new(r"^[0-9a-fA-F]{24}$").unwrap();
}

pub struct SchemaValidator {
    rules: Vec<Box<dyn FieldRule>>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Create validator with custom rules
    pub fn with_rules(rules: Vec<Box<dyn FieldRule>>) -> Self {
        Self { rules }
    }

    /// Adds a rule, replacing any existing rule for the same field.
    pub fn with_rule(mut self, rule: Box<dyn FieldRule>) -> Self {
        self.rules.retain(|existing| existing.field() != rule.field());
        self.rules.push(rule);
        self
    }

    /// Fields covered by the rule chain, in check order.
    pub fn rule_fields(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.field()).collect()
    }

    /// Checks raw items against the field rules.
    ///
    /// Duplicate slugs inside the batch are reported as warnings here; the
    /// hard uniqueness check runs on the sanitized batch.
    pub fn validate_items(&self, items: &[Value]) -> ValidationResult {
        let mut sink = IssueSink::default();

        for (index, raw) in items.iter().enumerate() {
            let Some(item) = raw.as_object() else {
                sink.error(index, "item", "Item must be an object", raw);
                continue;
            };
            for rule in &self.rules {
                rule.check(index, item, &mut sink);
            }
        }

        let slugs = items
            .iter()
            .map(|raw| raw.get("slug").and_then(Value::as_str));
        sink.warnings.extend(duplicate_slugs(slugs));

        ValidationResult::from_issues(sink.errors, sink.warnings)
    }

    /// Re-validates an already sanitized batch with the same rules.
    pub fn validate_sanitized(&self, items: &[ContentItem]) -> ValidationResult {
        let raw: Vec<Value> = items
            .iter()
            .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
            .collect();
        self.validate_items(&raw)
    }

    /// Converts raw input into trusted items.
    pub fn sanitize_items(&self, items: &[Value]) -> Vec<ContentItem> {
        items
            .iter()
            .enumerate()
            .map(|(index, raw)| sanitize_item(index, raw))
            .collect()
    }

    /// Slug collision check for a sanitized batch. Every repeat is an error.
    pub fn validate_unique_constraints(&self, items: &[ContentItem]) -> ValidationResult {
        let errors = duplicate_slugs(items.iter().map(|item| Some(item.slug.as_str())));
        ValidationResult::from_issues(errors, Vec::new())
    }
}

fn duplicate_slugs<'a>(slugs: impl Iterator<Item = Option<&'a str>>) -> Vec<ValidationIssue> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut issues = Vec::new();

    for (index, slug) in slugs.enumerate() {
        let Some(slug) = slug.filter(|slug| !slug.is_empty()) else {
            continue;
        };
        match first_seen.get(slug) {
            Some(first) => issues.push(ValidationIssue::new(
                Some(index),
                "slug",
                format!("Duplicate slug '{}' (first used by item {})", slug, first),
                Value::String(slug.to_string()),
            )),
            None => {
                first_seen.insert(slug, index);
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    struct ShortTitleRule;

    impl FieldRule for ShortTitleRule {
        fn field(&self) -> &'static str {
            "title"
        }

        fn check(&self, index: usize, item: &Map<String, Value>, sink: &mut IssueSink) {
            match item.get("title").and_then(Value::as_str) {
                Some(title) if title.chars().count() <= 12 => {}
                _ => sink.error(
                    index,
                    "title",
                    "Title must be at most 12 characters",
                    item.get("title").unwrap_or(&Value::Null),
                ),
            }
        }
    }

    #[test]
    fn test_custom_rule_replaces_rule_for_same_field() {
        let default_fields = SchemaValidator::new().rule_fields();
        let validator = SchemaValidator::new().with_rule(Box::new(ShortTitleRule));

        let fields = validator.rule_fields();
        assert_eq!(fields.len(), default_fields.len());
        assert_eq!(fields.iter().filter(|field| **field == "title").count(), 1);
        assert_eq!(fields.last(), Some(&"title"));

        let result = validator.validate_items(&[
            json!({ "title": "Short", "slug": "short" }),
            json!({ "slug": "untitled" }),
            json!({ "title": "A considerably longer title", "slug": "long" }),
        ]);

        let title_errors: Vec<_> = result
            .errors
            .iter()
            .filter(|issue| issue.field == "title")
            .collect();
        assert_eq!(title_errors.len(), 2);
        assert!(
            title_errors
                .iter()
                .all(|issue| issue.message == "Title must be at most 12 characters")
        );
        assert_eq!(title_errors[0].item_index, Some(1));
        assert_eq!(title_errors[1].item_index, Some(2));
    }

    #[test]
    fn test_valid_batch() {
        let validator = SchemaValidator::new();
        let result = validator.validate_items(&[json!({
            "title": "Valid Post",
            "slug": "valid-post",
            "description": "",
            "keywords": []
        })]);

        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_slug_is_warning_on_raw_batch() {
        let validator = SchemaValidator::new();
        let result = validator.validate_items(&[
            json!({ "title": "A", "slug": "a", "keywords": ["x", "x"] }),
            json!({ "title": "B", "slug": "a" }),
        ]);

        let duplicate = result
            .warnings
            .iter()
            .find(|issue| issue.message.contains("Duplicate slug"))
            .unwrap();
        assert_eq!(duplicate.item_index, Some(1));
        assert_eq!(duplicate.value, json!("a"));
    }

    #[test]
    fn test_errors_carry_index_field_and_value() {
        let validator = SchemaValidator::new();
        let result = validator.validate_items(&[
            json!({ "title": "Fine", "slug": "fine" }),
            json!({ "title": "", "slug": "Bad Slug" }),
            json!(17),
        ]);

        assert!(!result.valid);
        let fields: Vec<_> = result
            .errors
            .iter()
            .map(|issue| (issue.item_index, issue.field.as_str()))
            .collect();
        assert!(fields.contains(&(Some(1), "title")));
        assert!(fields.contains(&(Some(1), "slug")));
        assert!(fields.contains(&(Some(2), "item")));
    }

    #[test]
    fn test_unique_constraints_on_sanitized_batch() {
        let validator = SchemaValidator::new();
        let items = vec![
            ContentItem::new("A", "a"),
            ContentItem::new("B", "b"),
            ContentItem::new("C", "a"),
        ];

        let result = validator.validate_unique_constraints(&items);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].item_index, Some(2));
        assert!(result.errors[0].message.contains("'a'"));
    }

    #[test]
    fn test_sanitizing_valid_batch_is_neutral() {
        let validator = SchemaValidator::new();
        let raw = vec![
            json!({ "title": "Launch Day", "slug": "launch-day", "keywords": ["launch"] }),
            json!({ "title": "Recap", "slug": "recap", "description": "What happened", "approved": true }),
        ];
        assert!(validator.validate_items(&raw).valid);

        let sanitized = validator.sanitize_items(&raw);
        let slugs: Vec<_> = sanitized.iter().map(|item| item.slug.as_str()).collect();
        assert_eq!(slugs, vec!["launch-day", "recap"]);
        assert!(validator.validate_sanitized(&sanitized).valid);
        assert!(validator.validate_unique_constraints(&sanitized).valid);
    }

    #[test]
    fn test_sanitization_keeps_collision_detectable() {
        let validator = SchemaValidator::new();
        let raw = vec![
            json!({ "title": "A", "slug": "a", "keywords": ["x", "x"] }),
            json!({ "title": "B", "slug": "a" }),
        ];

        let sanitized = validator.sanitize_items(&raw);
        let unique = validator.validate_unique_constraints(&sanitized);
        assert!(!unique.valid);
        assert_eq!(unique.errors[0].item_index, Some(1));
    }
}
