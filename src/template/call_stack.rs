//! Dynamically scoped call stack
//!
//! Every region evaluation pushes a frame and pops it when done. Each tag
//! invocation records a `(name, slot)` entry on the frame it runs in, so a
//! handler can reach the slot of the nearest enclosing invocation of a given
//! name, whatever the static position of the tags in the source.

use crate::template::error::{TemplateError, TemplateResult};
use serde_json::Value;

type Frame = Vec<(String, Option<Value>)>;

#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Record an invocation of `name` with an empty slot on the top frame.
    pub fn record(&mut self, name: &str) {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push((name.to_string(), None));
        }
    }

    /// Value of the nearest `name` entry; `Ok(None)` if its slot is empty.
    pub fn get(&self, name: &str) -> TemplateResult<Option<&Value>> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(entry, _)| entry == name)
            .map(|(_, slot)| slot.as_ref())
            .ok_or_else(|| miss(name))
    }

    /// Set the slot of the nearest `name` entry.
    pub fn set(&mut self, name: &str, value: Value) -> TemplateResult<()> {
        let slot = self
            .frames
            .iter_mut()
            .rev()
            .flat_map(|frame| frame.iter_mut().rev())
            .find(|(entry, _)| entry == name)
            .map(|(_, slot)| slot)
            .ok_or_else(|| miss(name))?;
        *slot = Some(value);
        Ok(())
    }

    /// Whether any live frame holds an entry for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.iter().any(|(entry, _)| entry == name))
    }
}

fn miss(name: &str) -> TemplateError {
    TemplateError::CallStackMiss {
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_reaches_nearest_entry() {
        let mut stack = CallStack::new();
        stack.push();
        stack.record("outer");
        stack.push();
        stack.record("outer");
        stack.push();
        stack.record("inner");

        stack.set("outer", json!(2)).unwrap();
        assert_eq!(stack.get("outer").unwrap(), Some(&json!(2)));

        stack.pop();
        stack.pop();
        // the far outer slot was never touched
        assert_eq!(stack.get("outer").unwrap(), None);
    }

    #[test]
    fn test_latest_entry_in_frame_wins() {
        let mut stack = CallStack::new();
        stack.push();
        stack.record("row");
        stack.record("row");
        stack.set("row", json!("second")).unwrap();

        let frame = &stack.frames[0];
        assert_eq!(frame[0].1, None);
        assert_eq!(frame[1].1, Some(json!("second")));
    }

    #[test]
    fn test_missing_entry_is_an_error() {
        let mut stack = CallStack::new();
        stack.push();
        assert!(matches!(
            stack.get("nope"),
            Err(TemplateError::CallStackMiss { .. })
        ));
        assert!(stack.set("nope", json!(1)).is_err());
    }

    #[test]
    fn test_pop_discards_entries() {
        let mut stack = CallStack::new();
        stack.push();
        stack.push();
        stack.record("x");
        assert!(stack.contains("x"));
        stack.pop();
        assert!(!stack.contains("x"));
        assert_eq!(stack.depth(), 1);
    }
}
