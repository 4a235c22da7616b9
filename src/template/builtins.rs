//! Core plugins
//!
//! A handful of tags every template engine needs and that only talk to the
//! engine itself:
//!
//! | tag                       | result                                   |
//! |---------------------------|------------------------------------------|
//! | `{var:get:path}`          | value of `path`, empty if missing        |
//! | `{var:need:path}`         | value of `path`, error if missing        |
//! | `{var:set:path}v{:var}`   | stores the body, emits nothing           |
//! | `{var:append:path}v{:var}`| appends the body, emits nothing          |
//! | `{literal:}..{:literal}`  | the body, unexpanded                     |
//! | `{escape:}..{:escape}`    | the body with its tags escaped           |
//! | `{unescape:}..{:unescape}`| the body with escaped tags restored      |
//!
//! The `var:*` tags are reached through subtype fallback from `{var:..}`.

use crate::template::convention::Convention;
use crate::template::engine::{Engine, TagCall};
use crate::template::error::{TemplateError, TemplateResult};
use crate::template::registry::Plugin;
use crate::template::vars::{to_text, SetMode};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn tags(&self) -> Vec<(String, Convention)> {
        let lookup = Convention::new().require_param().no_body();
        let store = Convention::new().require_param().require_body();
        vec![
            ("var:get".to_string(), lookup),
            ("var:need".to_string(), lookup),
            ("var:set".to_string(), store),
            ("var:append".to_string(), store),
            (
                "literal".to_string(),
                Convention::new().no_param().require_body().text(),
            ),
            (
                "escape".to_string(),
                Convention::new().no_param().require_body().text(),
            ),
            ("unescape".to_string(), Convention::new().no_param().require_body()),
        ]
    }

    fn call(&self, engine: &mut Engine, call: &TagCall) -> TemplateResult<String> {
        let path = call.param.text().trim();
        match call.name.as_str() {
            "var:get" => Ok(engine.vars().get(path, false)?.map(to_text).unwrap_or_default()),
            "var:need" => Ok(engine.vars().get(path, true)?.map(to_text).unwrap_or_default()),
            "var:set" => {
                let value = Value::String(call.body.text().to_string());
                engine.vars_mut().set(path, value, SetMode::Replace)?;
                Ok(String::new())
            }
            "var:append" => {
                let value = Value::String(call.body.text().to_string());
                engine.vars_mut().set(path, value, SetMode::Append)?;
                Ok(String::new())
            }
            "literal" => Ok(call.body.text().to_string()),
            "escape" => Ok(engine.escape(call.body.text())),
            "unescape" => Ok(engine.unescape(call.body.text())),
            other => Err(TemplateError::handler(format!(
                "core plugin has no tag '{}'",
                other
            ))),
        }
    }
}
