pub mod schemas;

use chrono::NaiveDate;
use jsonschema::Validator;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::HashMap;

pub type FrontmatterMap = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

pub struct FrontmatterParser;

impl FrontmatterParser {
    /// Line index of the closing `---` fence, if the file opens with a fence.
    pub fn closing_fence_line(content: &str) -> Option<usize> {
        let mut lines = content.split('\n').map(|l| l.trim_end_matches('\r'));
        if lines.next()?.trim_end() != "---" {
            return None;
        }
        lines
            .position(|l| {
                let t = l.trim_end();
                t == "---" || t == "..."
            })
            .map(|i| i + 1)
    }

    /// First line of the body (0 when there is no frontmatter).
    pub fn body_start_line(content: &str) -> usize {
        Self::closing_fence_line(content).map(|i| i + 1).unwrap_or(0)
    }

    /// Split a markdown file into raw frontmatter YAML and body
    pub fn split(content: &str) -> (Option<String>, String) {
        match Self::closing_fence_line(content) {
            Some(close) => {
                let lines: Vec<&str> = content.split('\n').collect();
                let yaml = lines[1..close].join("\n");
                let body = lines[close + 1..].join("\n");
                (Some(yaml), body.trim_start_matches(['\n', '\r']).to_string())
            }
            None => (None, content.to_string()),
        }
    }

    /// Parse a markdown file into frontmatter and body
    pub fn parse(content: &str) -> Result<(FrontmatterMap, String), String> {
        let (raw, body) = Self::split(content);
        match raw {
            Some(raw) => Ok((Self::parse_yaml(&raw)?, body)),
            None => Ok((FrontmatterMap::new(), body)),
        }
    }

    /// Parse only the frontmatter from YAML string
    pub fn parse_yaml(yaml_str: &str) -> Result<FrontmatterMap, String> {
        if yaml_str.trim().is_empty() {
            return Ok(FrontmatterMap::new());
        }
        let value: Value = serde_yaml::from_str(yaml_str)
            .map_err(|e| format!("Failed to parse YAML: {}", e))?;
        match value {
            Value::Null => Ok(FrontmatterMap::new()),
            Value::Mapping(mapping) => Ok(mapping
                .into_iter()
                .filter_map(|(k, v)| scalar_to_string(&k).map(|k| (k, v)))
                .collect()),
            _ => Err("Failed to parse YAML: frontmatter is not a mapping".to_string()),
        }
    }

    /// Validate frontmatter against a JSON Schema
    pub fn validate(
        frontmatter: &FrontmatterMap,
        schema_value: &serde_json::Value,
    ) -> Result<Vec<ValidationError>, String> {
        let json_value = serde_json::to_value(frontmatter)
            .map_err(|e| format!("Failed to convert frontmatter to JSON: {}", e))?;

        let compiled_schema = Validator::new(schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))?;

        let mut errors = Vec::new();
        if let Err(validation_errors) = compiled_schema.validate(&json_value) {
            for error in validation_errors {
                errors.push(ValidationError {
                    path: error.instance_path.to_string(),
                    message: error.to_string(),
                });
            }
        }

        Ok(errors)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String value of a field; numbers and booleans are stringified.
pub fn get_str(frontmatter: &FrontmatterMap, key: &str) -> Option<String> {
    frontmatter
        .get(key)
        .and_then(scalar_to_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A list field; a single scalar counts as a one-element list.
pub fn get_string_list(frontmatter: &FrontmatterMap, key: &str) -> Vec<String> {
    match frontmatter.get(key) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => scalar_to_string(other)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}

/// Accepts `YYYY-MM-DD` and datetimes starting with one.
pub fn get_date(frontmatter: &FrontmatterMap, key: &str) -> Option<NaiveDate> {
    let raw = get_str(frontmatter, key)?;
    let date_part = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn get_u32(frontmatter: &FrontmatterMap, key: &str) -> Option<u32> {
    match frontmatter.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_bool(frontmatter: &FrontmatterMap, key: &str) -> Option<bool> {
    match frontmatter.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Extract tags from frontmatter.
/// Handles list format, comma/space separated strings and faceted
/// mappings (`tags: { campaign: [a] }` -> `campaign/a`).
pub fn extract_tags(frontmatter: &FrontmatterMap) -> Vec<String> {
    let mut tags = Vec::new();
    let mut push = |tag: &str| {
        let clean = tag.trim().trim_start_matches('#').to_lowercase();
        if !clean.is_empty() && !tags.contains(&clean) {
            tags.push(clean);
        }
    };

    match frontmatter.get("tags") {
        Some(Value::Mapping(mapping)) => {
            for (namespace, tag_list) in mapping {
                let ns = scalar_to_string(namespace).unwrap_or_default();
                if let Some(seq) = tag_list.as_sequence() {
                    for tag in seq.iter().filter_map(scalar_to_string) {
                        push(&format!("{}/{}", ns, tag.trim_start_matches('#')));
                    }
                }
            }
        }
        Some(Value::Sequence(seq)) => {
            for tag in seq.iter().filter_map(scalar_to_string) {
                push(&tag);
            }
        }
        Some(other) => {
            if let Some(s) = scalar_to_string(other) {
                for tag in s.split(|c: char| c == ',' || c.is_whitespace()) {
                    push(tag);
                }
            }
        }
        None => {}
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_frontmatter() {
        let content = r#"---
title: "Test Note"
type: quest
priority: 2
---

This is the body content."#;

        let (frontmatter, body) = FrontmatterParser::parse(content).unwrap();
        assert_eq!(body.trim(), "This is the body content.");
        assert_eq!(get_str(&frontmatter, "title").as_deref(), Some("Test Note"));
        assert_eq!(get_u32(&frontmatter, "priority"), Some(2));
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let content = "Just some markdown content.";
        let (frontmatter, body) = FrontmatterParser::parse(content).unwrap();
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
        assert_eq!(FrontmatterParser::body_start_line(content), 0);
    }

    #[test]
    fn test_unclosed_fence_is_body() {
        let content = "---\ntitle: x\nno closing fence";
        assert!(FrontmatterParser::closing_fence_line(content).is_none());
        let (raw, body) = FrontmatterParser::split(content);
        assert!(raw.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn test_empty_frontmatter() {
        let (fm, body) = FrontmatterParser::parse("---\n---\nbody").unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(FrontmatterParser::parse("---\ntitle: [unclosed\n---\n").is_err());
    }

    #[test]
    fn test_extract_tags_formats() {
        let fm = FrontmatterParser::parse_yaml("tags: [NPC, '#Villain']").unwrap();
        assert_eq!(extract_tags(&fm), vec!["npc", "villain"]);

        let fm = FrontmatterParser::parse_yaml("tags: quest, health").unwrap();
        assert_eq!(extract_tags(&fm), vec!["quest", "health"]);

        let fm = FrontmatterParser::parse_yaml("tags:\n  campaign: [Saltmarsh]").unwrap();
        assert_eq!(extract_tags(&fm), vec!["campaign/saltmarsh"]);
    }

    #[test]
    fn test_date_and_list_helpers() {
        let fm = FrontmatterParser::parse_yaml(
            "reviewed: 2026-10-01T09:30\ngroups: '[[Iron Guild]]'\nalive: no",
        )
        .unwrap();
        assert_eq!(
            get_date(&fm, "reviewed"),
            NaiveDate::from_ymd_opt(2026, 10, 1)
        );
        assert_eq!(get_string_list(&fm, "groups"), vec!["[[Iron Guild]]"]);
        assert_eq!(get_bool(&fm, "alive"), Some(false));
    }
}
