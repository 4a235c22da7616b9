//! Main module for the template engine
//!
//! Components, leaves first: [`lexer`] splits text into literal and tag
//! segments, [`matcher`] pairs open and close tags, [`registry`] maps tag
//! names to handlers and their [`convention`]s, and [`engine`] expands a
//! loaded [`document`] with the help of the [`call_stack`], the variable
//! store in [`vars`] and the [`deferred`] queue.

pub mod builtins;
pub mod call_stack;
pub mod config;
pub mod convention;
pub mod deferred;
pub mod document;
pub mod engine;
pub mod error;
pub mod escape;
pub mod lexer;
pub mod matcher;
pub mod placeholder;
pub mod registry;
pub mod shapes;
pub mod vars;

pub use self::builtins::CorePlugin;
pub use self::config::{DanglingEndPolicy, Delimiters, EngineConfig, Loader, UnknownTagPolicy};
pub use self::convention::{Arity, BodyMode, BodyShape, Convention, Flag, ParamShape};
pub use self::engine::{Engine, TagCall};
pub use self::error::{TemplateError, TemplateResult, Violation};
pub use self::registry::{Handler, Plugin, PluginRegistry};
pub use self::shapes::{Body, Param, XmlNode};
pub use self::vars::{SetMode, VariableStore};
