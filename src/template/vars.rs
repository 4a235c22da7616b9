//! Variable store
//!
//! A nested map addressed by dot-separated paths (`page.title`). It lives as
//! long as the engine and is shared by all handlers, independent of where
//! tags sit in the document.

use crate::template::error::{TemplateError, TemplateResult};
use serde_json::{Map, Value};

/// How [`VariableStore::set`] treats an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    #[default]
    Replace,
    /// Fail if a value already exists
    Keep,
    /// Concatenate strings, extend arrays
    Append,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    root: Map<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `path`. A missing value is `Ok(None)` unless `required`.
    pub fn get(&self, path: &str, required: bool) -> TemplateResult<Option<&Value>> {
        let parts = split_path(path)?;
        let found = lookup(&self.root, &parts);
        match found {
            Some(value) => Ok(Some(value)),
            None if required => Err(TemplateError::VariableMissing {
                path: path.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Text of the value at `path`, if any.
    pub fn get_text(&self, path: &str) -> TemplateResult<Option<String>> {
        Ok(self.get(path, false)?.map(to_text))
    }

    /// Store `value` at `path`, creating intermediate maps.
    pub fn set(&mut self, path: &str, value: Value, mode: SetMode) -> TemplateResult<()> {
        let parts = split_path(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(empty_path());
        };

        let mut map = &mut self.root;
        for part in parents {
            let entry = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(inner) => map = inner,
                _ => {
                    return Err(TemplateError::VariableConflict {
                        path: path.to_string(),
                        message: format!("'{}' is not a map", part),
                    })
                }
            }
        }

        match mode {
            SetMode::Replace => {
                map.insert(last.to_string(), value);
            }
            SetMode::Keep => {
                if map.contains_key(*last) {
                    return Err(TemplateError::VariableExists {
                        path: path.to_string(),
                    });
                }
                map.insert(last.to_string(), value);
            }
            SetMode::Append => match map.get_mut(*last) {
                None => {
                    map.insert(last.to_string(), value);
                }
                Some(Value::String(existing)) => existing.push_str(&to_text(&value)),
                Some(Value::Array(items)) => match value {
                    Value::Array(more) => items.extend(more),
                    other => items.push(other),
                },
                Some(_) => {
                    return Err(TemplateError::VariableConflict {
                        path: path.to_string(),
                        message: "only strings and arrays can be appended to".to_string(),
                    })
                }
            },
        }
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> TemplateResult<Option<Value>> {
        let parts = split_path(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(empty_path());
        };
        let mut map = &mut self.root;
        for part in parents {
            match map.get_mut(*part) {
                Some(Value::Object(inner)) => map = inner,
                _ => return Ok(None),
            }
        }
        Ok(map.remove(*last))
    }

    pub fn clear(&mut self) {
        self.root.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The whole store as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

/// Render a value as template text: strings verbatim, null as empty,
/// everything else as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lookup<'a>(root: &'a Map<String, Value>, parts: &[&str]) -> Option<&'a Value> {
    let (last, parents) = parts.split_last()?;
    let mut map = root;
    for part in parents {
        match map.get(*part) {
            Some(Value::Object(inner)) => map = inner,
            _ => return None,
        }
    }
    map.get(*last)
}

fn split_path(path: &str) -> TemplateResult<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').map(str::trim).collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(TemplateError::VariableConflict {
            path: path.to_string(),
            message: "path has an empty component".to_string(),
        });
    }
    Ok(parts)
}

fn empty_path() -> TemplateError {
    TemplateError::VariableConflict {
        path: String::new(),
        message: "path has an empty component".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get_nested() {
        let mut vars = VariableStore::new();
        vars.set("page.meta.title", json!("Home"), SetMode::Replace)
            .unwrap();
        assert_eq!(vars.get("page.meta.title", false).unwrap(), Some(&json!("Home")));
        assert_eq!(vars.get("page.meta", false).unwrap(), Some(&json!({"title": "Home"})));
    }

    #[test]
    fn test_missing_is_distinguishable_from_empty() {
        let mut vars = VariableStore::new();
        vars.set("empty", json!(""), SetMode::Replace).unwrap();
        assert_eq!(vars.get("empty", false).unwrap(), Some(&json!("")));
        assert_eq!(vars.get("absent", false).unwrap(), None);
        assert_eq!(vars.get("empty.deeper", false).unwrap(), None);
    }

    #[test]
    fn test_required_missing_is_fatal() {
        let vars = VariableStore::new();
        assert!(matches!(
            vars.get("a.b", true),
            Err(TemplateError::VariableMissing { .. })
        ));
    }

    #[test]
    fn test_keep_mode_refuses_overwrite() {
        let mut vars = VariableStore::new();
        vars.set("x", json!(1), SetMode::Keep).unwrap();
        assert!(matches!(
            vars.set("x", json!(2), SetMode::Keep),
            Err(TemplateError::VariableExists { .. })
        ));
        assert_eq!(vars.get("x", true).unwrap(), Some(&json!(1)));
    }

    #[test]
    fn test_append_mode() {
        let mut vars = VariableStore::new();
        vars.set("s", json!("a"), SetMode::Append).unwrap();
        vars.set("s", json!("b"), SetMode::Append).unwrap();
        vars.set("s", json!(3), SetMode::Append).unwrap();
        assert_eq!(vars.get_text("s").unwrap().unwrap(), "ab3");

        vars.set("list", json!([1]), SetMode::Replace).unwrap();
        vars.set("list", json!(2), SetMode::Append).unwrap();
        vars.set("list", json!([3, 4]), SetMode::Append).unwrap();
        assert_eq!(vars.get("list", true).unwrap(), Some(&json!([1, 2, 3, 4])));

        vars.set("n", json!(1), SetMode::Replace).unwrap();
        assert!(vars.set("n", json!(1), SetMode::Append).is_err());
    }

    #[test]
    fn test_path_through_scalar_conflicts() {
        let mut vars = VariableStore::new();
        vars.set("a", json!("scalar"), SetMode::Replace).unwrap();
        assert!(matches!(
            vars.set("a.b", json!(1), SetMode::Replace),
            Err(TemplateError::VariableConflict { .. })
        ));
    }

    #[test]
    fn test_empty_path_component() {
        let vars = VariableStore::new();
        assert!(vars.get("a..b", false).is_err());
        assert!(vars.get("", false).is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut vars = VariableStore::new();
        vars.set("a.b", json!(1), SetMode::Replace).unwrap();
        assert_eq!(vars.remove("a.b").unwrap(), Some(json!(1)));
        assert_eq!(vars.remove("a.b").unwrap(), None);
        vars.clear();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!("x")), "x");
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!(1.5)), "1.5");
        assert_eq!(to_text(&json!([1, "a"])), "[1,\"a\"]");
    }
}
