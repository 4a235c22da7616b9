//! Plugin registry
//!
//! Maps tag names to a [`Binding`]: the handler to call plus the calling
//! convention it expects. Lookups go through three steps:
//!
//! 1. a binding registered under [`CATCH_ALL`] intercepts every tag,
//! 2. an exact binding for the tag name,
//! 3. subtype fallback: `{row:init:x}` with no `row` binding resolves to a
//!    `row:init` binding with parameter `x`.
//!
//! When all three miss, an optional autoload callback gets one chance to
//! register the missing tag before the lookup is retried once. The callback
//! is detached while it runs, so a miss discovered during autoload fails
//! without triggering another autoload.

use crate::template::convention::Convention;
use crate::template::engine::{Engine, TagCall};
use crate::template::error::{TemplateError, TemplateResult};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Tag name whose binding receives every tag.
pub const CATCH_ALL: &str = "*";

/// Something that can expand a tag.
///
/// Errors are returned to the caller of the expansion as they are, with one
/// exception: a [`TemplateError::Handler`] whose `tag` is empty gets the name
/// of the binding that was called filled in.
pub trait Handler {
    fn call(&self, engine: &mut Engine, call: &TagCall) -> TemplateResult<String>;
}

impl<F> Handler for F
where
    F: Fn(&mut Engine, &TagCall) -> TemplateResult<String>,
{
    fn call(&self, engine: &mut Engine, call: &TagCall) -> TemplateResult<String> {
        self(engine, call)
    }
}

/// A plugin serving several tags through one entry point.
///
/// [`Plugin::tags`] declares the tag names and their conventions; every
/// invocation of any of them arrives at [`Plugin::call`] with the resolved
/// tag name in [`TagCall::name`].
pub trait Plugin {
    fn tags(&self) -> Vec<(String, Convention)>;

    fn call(&self, engine: &mut Engine, call: &TagCall) -> TemplateResult<String>;
}

struct PluginHandler<P>(Rc<P>);

impl<P: Plugin> Handler for PluginHandler<P> {
    fn call(&self, engine: &mut Engine, call: &TagCall) -> TemplateResult<String> {
        self.0.call(engine, call)
    }
}

/// Handler plus calling convention for one tag name.
#[derive(Clone)]
pub struct Binding {
    pub handler: Rc<dyn Handler>,
    pub convention: Convention,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

/// A successful lookup: the binding and the name/parameter it was found with.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub binding: Binding,
    pub name: String,
    pub param: String,
}

/// Callback that may register plugins for a tag name nobody handles yet.
pub type Autoload = Box<dyn FnMut(&str, &mut PluginRegistry) -> TemplateResult<()>>;

pub struct PluginRegistry {
    bindings: HashMap<String, Binding>,
    separator: String,
    autoload: Option<Autoload>,
}

impl PluginRegistry {
    /// Create an empty registry. `separator` joins subtype names (`row:init`).
    pub fn new(separator: impl Into<String>) -> Self {
        PluginRegistry {
            bindings: HashMap::new(),
            separator: separator.into(),
            autoload: None,
        }
    }

    /// Register a handler. An existing binding with the same name is replaced.
    pub fn register(
        &mut self,
        name: &str,
        handler: Rc<dyn Handler>,
        convention: Convention,
    ) -> TemplateResult<()> {
        self.check_name(name)?;
        convention
            .validate()
            .map_err(|message| TemplateError::InvalidConvention {
                tag: name.to_string(),
                message,
            })?;
        self.bindings.insert(
            name.to_string(),
            Binding {
                handler,
                convention,
            },
        );
        Ok(())
    }

    /// Register a closure as handler.
    pub fn register_fn<F>(&mut self, name: &str, convention: Convention, f: F) -> TemplateResult<()>
    where
        F: Fn(&mut Engine, &TagCall) -> TemplateResult<String> + 'static,
    {
        self.register(name, Rc::new(f), convention)
    }

    /// Register every tag a plugin declares.
    pub fn register_plugin<P: Plugin + 'static>(&mut self, plugin: P) -> TemplateResult<()> {
        let plugin = Rc::new(plugin);
        for (name, convention) in plugin.tags() {
            let handler: Rc<dyn Handler> = Rc::new(PluginHandler(Rc::clone(&plugin)));
            self.register(&name, handler, convention)?;
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        self.bindings.remove(name)
    }

    /// Exact binding for `name`, ignoring catch-all and fallback.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Binding for `name`, honouring the catch-all binding.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.bindings
            .get(CATCH_ALL)
            .or_else(|| self.bindings.get(name))
            .cloned()
    }

    /// All registered tag names (sorted)
    pub fn list_tags(&self) -> Vec<String> {
        let mut names: Vec<_> = self.bindings.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_autoload(&mut self, autoload: Autoload) {
        self.autoload = Some(autoload);
    }

    /// Resolve a tag declaration, autoloading once on a miss.
    pub fn resolve(&mut self, name: &str, param: &str) -> TemplateResult<Option<Resolved>> {
        if let Some(resolved) = self.resolve_once(name, param) {
            return Ok(Some(resolved));
        }

        let Some(mut autoload) = self.autoload.take() else {
            return Ok(None);
        };
        debug!(tag = name, "autoloading plugin");
        let result = autoload(name, self);
        if self.autoload.is_none() {
            self.autoload = Some(autoload);
        }
        result?;
        Ok(self.resolve_once(name, param))
    }

    fn resolve_once(&self, name: &str, param: &str) -> Option<Resolved> {
        if let Some(binding) = self.bindings.get(CATCH_ALL).or_else(|| self.bindings.get(name)) {
            return Some(Resolved {
                binding: binding.clone(),
                name: name.to_string(),
                param: param.to_string(),
            });
        }

        if param.is_empty() {
            return None;
        }
        let (first, rest) = param
            .split_once(self.separator.as_str())
            .unwrap_or((param, ""));
        let subtype = format!("{}{}{}", name, self.separator, first);
        self.bindings.get(&subtype).map(|binding| Resolved {
            binding: binding.clone(),
            name: subtype,
            param: rest.to_string(),
        })
    }

    fn check_name(&self, name: &str) -> TemplateResult<()> {
        if name == CATCH_ALL {
            return Ok(());
        }
        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        };
        if name.split(self.separator.as_str()).all(valid_part) {
            Ok(())
        } else {
            Err(TemplateError::InvalidConvention {
                tag: name.to_string(),
                message: "tag names use letters, digits, '_', '.' and '-'".to_string(),
            })
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(":")
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("tags", &self.list_tags())
            .field("autoload", &self.autoload.is_some())
            .finish()
    }
}
