//! `{:=key}` placeholders
//!
//! A substitution syntax that lives next to the tag engine, not inside it:
//! placeholders are replaced by plain values looked up by dotted path, no
//! plugin is involved. Placeholders without a value are left in place.

use crate::template::config::PlaceholderConfig;
use crate::template::error::{TemplateError, TemplateResult};
use crate::template::vars::to_text;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

/// Key characters: the tag name class without the empty match.
const KEY_CLASS: &str = r"[A-Za-z0-9_.\-]+";

static DEFAULT_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{:=\s*([A-Za-z0-9_.\-]+)\s*\}").unwrap());

#[derive(Debug, Clone)]
pub struct Placeholders {
    pattern: Regex,
}

impl Placeholders {
    pub fn new(config: &PlaceholderConfig) -> TemplateResult<Self> {
        if config.prefix.is_empty() || config.suffix.is_empty() {
            return Err(TemplateError::Config(
                "placeholder prefix and suffix must not be empty".to_string(),
            ));
        }
        let source = format!(
            r"{}\s*({})\s*{}",
            regex::escape(&config.prefix),
            KEY_CLASS,
            regex::escape(&config.suffix)
        );
        let pattern = Regex::new(&source).map_err(|e| TemplateError::Config(e.to_string()))?;
        Ok(Placeholders { pattern })
    }

    /// Substitute every placeholder whose key has a value in `values`.
    pub fn replace_tags(&self, text: &str, values: &Value) -> String {
        replace_with(&self.pattern, text, values)
    }

    pub fn remove_tags(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }

    /// Distinct placeholder keys in order of first appearance.
    pub fn get_tag_list(&self, text: &str) -> Vec<String> {
        tag_list(&self.pattern, text)
    }
}

impl Default for Placeholders {
    fn default() -> Self {
        Placeholders {
            pattern: DEFAULT_PLACEHOLDER.clone(),
        }
    }
}

/// [`Placeholders::replace_tags`] with the default `{:=key}` syntax.
pub fn replace_tags(text: &str, values: &Value) -> String {
    replace_with(&DEFAULT_PLACEHOLDER, text, values)
}

/// [`Placeholders::remove_tags`] with the default `{:=key}` syntax.
pub fn remove_tags(text: &str) -> String {
    DEFAULT_PLACEHOLDER.replace_all(text, "").into_owned()
}

/// [`Placeholders::get_tag_list`] with the default `{:=key}` syntax.
pub fn get_tag_list(text: &str) -> Vec<String> {
    tag_list(&DEFAULT_PLACEHOLDER, text)
}

fn replace_with(pattern: &Regex, text: &str, values: &Value) -> String {
    let mut flat = HashMap::new();
    flatten("", values, &mut flat);
    pattern
        .replace_all(text, |caps: &Captures| {
            let key = caps.get(1).map_or("", |m| m.as_str());
            match flat.get(key) {
                Some(value) => value.clone(),
                None => caps.get(0).map_or(String::new(), |m| m.as_str().to_string()),
            }
        })
        .into_owned()
}

fn tag_list(pattern: &Regex, text: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(text) {
        if let Some(key) = caps.get(1) {
            if !keys.iter().any(|k| k == key.as_str()) {
                keys.push(key.as_str().to_string());
            }
        }
    }
    keys
}

/// Collect the leaves of `value` under dotted keys (`a.b`, `list.0`).
fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&join(key.as_str()), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(&join(index.to_string().as_str()), child, out);
            }
        }
        leaf if !prefix.is_empty() => {
            out.insert(prefix.to_string(), to_text(leaf));
        }
        _ => {}
    }
}
