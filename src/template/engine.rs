//! Expansion engine
//!
//! The engine owns everything one expansion needs: the loaded [`Document`],
//! the plugin registry, the call stack, the variable store and the deferred
//! queue. [`Engine::evaluate`] walks the document's segments and splices the
//! output of every tag's handler into the surrounding text.
//!
//! # Evaluation
//!
//! Evaluating a segment range pushes a call stack frame, emits literals
//! verbatim, skips close tags consumed by a pair and hands every open tag to
//! the invocation step, then pops the frame again. An invocation
//!
//! 1. resolves the tag through the registry (catch-all, exact name, subtype
//!    fallback, autoload) and applies the unknown-tag policy on a miss,
//! 2. checks parameter and body presence against the tag's convention,
//! 3. records the tag on the current call stack frame and, for deferred
//!    tags, reserves a queue slot,
//! 4. builds the body: raw source text for `TEXT` tags, otherwise the result
//!    of evaluating the enclosed range,
//! 5. decodes parameter and body into their declared shapes,
//! 6. queues the call (deferred) or calls the handler, expanding its output
//!    once more for `REDO` tags.
//!
//! Once the whole document is rendered, the deferred entries are replayed in
//! source order against the accumulated output.
//!
//! Handlers receive `&mut Engine`, so they can read and write the call stack
//! and variables or expand text of their own through [`Engine::expand`].

use crate::template::call_stack::CallStack;
use crate::template::config::{DanglingEndPolicy, EngineConfig, UnknownTagPolicy};
use crate::template::convention::{Arity, BodyMode, Convention};
use crate::template::deferred::{DeferredEntry, DeferredQueue};
use crate::template::document::Document;
use crate::template::error::{source_excerpt, TemplateError, TemplateResult, Violation};
use crate::template::escape::Escaper;
use crate::template::lexer::{Lexer, Segment, TagDecl};
use crate::template::matcher::{decl_ref, Endpos};
use crate::template::placeholder::Placeholders;
use crate::template::registry::{Handler, Plugin, PluginRegistry, Resolved};
use crate::template::shapes::{decode_body, decode_param, Body, Param};
use crate::template::vars::VariableStore;
use serde_json::Value;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Bytes of source shown around a tag in convention errors.
const EXCERPT_RADIUS: usize = 24;

/// One tag invocation as seen by its handler.
#[derive(Debug, Clone, PartialEq)]
pub struct TagCall {
    /// Name of the binding that handles the call (`row:init` after fallback)
    pub name: String,
    /// Name as written in the source
    pub tag: String,
    pub param: Param,
    pub body: Body,
    /// Byte offset of the declaration in its source text
    pub offset: usize,
    /// Accumulated output, set while a deferred call is replayed
    pub document: Option<String>,
}

impl TagCall {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        TagCall {
            tag: name.clone(),
            name,
            param: Param::Text(String::new()),
            body: Body::None,
            offset: 0,
            document: None,
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.param = param;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    lexer: Lexer,
    escaper: Escaper,
    placeholders: Placeholders,
    registry: PluginRegistry,
    call_stack: CallStack,
    vars: VariableStore,
    deferred: DeferredQueue,
    document: Rc<Document>,
    depth: usize,
    evaluating: bool,
}

impl Engine {
    /// Build an engine. Fails if the delimiters or placeholder syntax are
    /// unusable.
    pub fn new(config: EngineConfig) -> TemplateResult<Self> {
        if config.engine.max_depth == 0 {
            return Err(TemplateError::Config(
                "max_depth must be at least 1".to_string(),
            ));
        }
        let lexer = Lexer::new(config.delimiters.clone())?;
        let escaper = Escaper::new(config.delimiters.clone())?;
        let placeholders = Placeholders::new(&config.placeholders)?;
        let registry = PluginRegistry::new(config.delimiters.separator.clone());
        Ok(Engine {
            config,
            lexer,
            escaper,
            placeholders,
            registry,
            call_stack: CallStack::new(),
            vars: VariableStore::new(),
            deferred: DeferredQueue::new(),
            document: Rc::new(Document::default()),
            depth: 0,
            evaluating: false,
        })
    }

    /// Engine with the built-in default configuration.
    pub fn with_defaults() -> TemplateResult<Self> {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    pub fn register(
        &mut self,
        name: &str,
        handler: Rc<dyn Handler>,
        convention: Convention,
    ) -> TemplateResult<()> {
        self.registry.register(name, handler, convention)
    }

    pub fn register_fn<F>(&mut self, name: &str, convention: Convention, f: F) -> TemplateResult<()>
    where
        F: Fn(&mut Engine, &TagCall) -> TemplateResult<String> + 'static,
    {
        self.registry.register_fn(name, convention, f)
    }

    pub fn register_plugin<P: Plugin + 'static>(&mut self, plugin: P) -> TemplateResult<()> {
        self.registry.register_plugin(plugin)
    }

    /// Install the callback asked to register plugins for unknown tag names.
    pub fn set_autoload<F>(&mut self, autoload: F)
    where
        F: FnMut(&str, &mut PluginRegistry) -> TemplateResult<()> + 'static,
    {
        self.registry.set_autoload(Box::new(autoload));
    }

    /// Load template text, replacing the current document.
    pub fn load(&mut self, source: impl Into<String>) -> TemplateResult<()> {
        let document = Document::parse(source, &self.lexer)?;
        debug!(
            segments = document.len(),
            tags = document.tag_count(),
            "template loaded"
        );
        self.document = Rc::new(document);
        Ok(())
    }

    pub fn load_path(&mut self, path: impl AsRef<Path>) -> TemplateResult<()> {
        let source = std::fs::read_to_string(path.as_ref())?;
        self.load(source)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Whether the loaded document contains an open tag called `name`.
    pub fn has_tag(&self, name: &str) -> bool {
        self.lexer.has_tag(self.document.source(), name)
    }

    /// Expand the loaded document.
    pub fn evaluate(&mut self) -> TemplateResult<String> {
        let document = Rc::clone(&self.document);
        self.run(document)
    }

    /// Load `source` and expand it.
    ///
    /// Called from a handler, `source` is expanded inside the running
    /// evaluation like [`Engine::expand`] and the loaded document is kept.
    pub fn render(&mut self, source: impl Into<String>) -> TemplateResult<String> {
        if self.evaluating {
            return self.expand_nested(&source.into());
        }
        self.load(source)?;
        self.evaluate()
    }

    /// Expand `text` through the full pipeline.
    ///
    /// Called from a handler, the text is expanded inside the running
    /// evaluation: it shares the call stack and deferred tags in it are
    /// replayed with the rest of the document. Called outside an evaluation,
    /// it is a complete expansion of its own that leaves the loaded document
    /// alone.
    pub fn expand(&mut self, text: &str) -> TemplateResult<String> {
        if self.evaluating {
            self.expand_nested(text)
        } else {
            let document = Rc::new(Document::parse(text, &self.lexer)?);
            self.run(document)
        }
    }

    /// `{:=key}` placeholder syntax as configured.
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    pub fn escape(&self, text: &str) -> String {
        self.escaper.escape(text)
    }

    pub fn unescape(&self, text: &str) -> String {
        self.escaper.unescape(text)
    }

    /// Slot of the nearest enclosing invocation of `name`.
    pub fn get_call_stack(&self, name: &str) -> TemplateResult<Option<Value>> {
        Ok(self.call_stack.get(name)?.cloned())
    }

    /// Set the slot of the nearest enclosing invocation of `name`.
    pub fn set_call_stack(&mut self, name: &str, value: impl Into<Value>) -> TemplateResult<()> {
        self.call_stack.set(name, value.into())
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    pub fn reset_vars(&mut self) {
        self.vars.clear();
    }

    fn run(&mut self, document: Rc<Document>) -> TemplateResult<String> {
        // re-entered from a handler: the outer pass owns the state
        if self.evaluating {
            return self.eval_range(&document, 0, document.len());
        }

        self.call_stack.clear();
        self.deferred.clear();
        self.depth = 0;
        self.evaluating = true;

        let result = self
            .eval_range(&document, 0, document.len())
            .and_then(|output| self.replay_deferred(output));

        self.evaluating = false;
        self.deferred.clear();
        result
    }

    fn expand_nested(&mut self, text: &str) -> TemplateResult<String> {
        let document = Document::parse(text, &self.lexer)?;
        self.eval_range(&document, 0, document.len())
    }

    /// Replay queued deferred calls. Deferred tags queued by a replayed
    /// handler run after the current batch.
    fn replay_deferred(&mut self, mut output: String) -> TemplateResult<String> {
        loop {
            let entries = self.deferred.drain();
            if entries.is_empty() {
                return Ok(output);
            }
            for entry in entries {
                debug!(tag = %entry.call.name, "replaying deferred tag");
                let mut call = entry.call;
                call.document = Some(output);
                output = self.call_handler(entry.handler.as_ref(), &call)?;
                if entry.convention.redo {
                    output = self.expand_nested(&output)?;
                }
            }
        }
    }

    fn eval_range(&mut self, document: &Document, start: usize, end: usize) -> TemplateResult<String> {
        let limit = self.config.engine.max_depth;
        if self.depth >= limit {
            return Err(TemplateError::RecursionLimit { limit });
        }

        self.depth += 1;
        self.call_stack.push();
        let result = self.eval_segments(document, start, end);
        self.call_stack.pop();
        self.depth -= 1;
        result
    }

    fn eval_segments(&mut self, document: &Document, start: usize, end: usize) -> TemplateResult<String> {
        let mut out = String::new();
        let mut i = start;

        while i < end {
            let Some(segment) = document.segments().get(i) else {
                break;
            };
            let decl = match segment {
                Segment::Literal(text) => {
                    out.push_str(text);
                    i += 1;
                    continue;
                }
                Segment::Tag(decl) => decl,
            };

            match document.classification(i) {
                Some(Endpos::EndMarker) => i += 1,
                Some(Endpos::DanglingEnd) => {
                    self.dangling_end(decl, &mut out);
                    i += 1;
                }
                Some(Endpos::NoBody) => {
                    out.push_str(&self.invoke(document, i, decl, None)?);
                    i += 1;
                }
                Some(Endpos::MatchedEnd(close)) => {
                    out.push_str(&self.invoke(document, i, decl, Some(close))?);
                    i = close + 1;
                }
                Some(Endpos::Unresolved) | None => {
                    return Err(TemplateError::Unresolved {
                        tag: decl_ref(decl, &self.config.delimiters),
                    })
                }
            }
        }

        Ok(out)
    }

    fn dangling_end(&self, decl: &TagDecl, out: &mut String) {
        let delimiters = &self.config.delimiters;
        warn!(
            tag = %delimiters.wrap(&decl.name, &decl.param),
            offset = decl.span.start,
            "close tag without matching open tag"
        );
        if self.config.engine.dangling_end == DanglingEndPolicy::Keep {
            out.push_str(&delimiters.wrap(&decl.name, &decl.param));
        }
    }

    fn invoke(
        &mut self,
        document: &Document,
        index: usize,
        decl: &TagDecl,
        close: Option<usize>,
    ) -> TemplateResult<String> {
        let Some(Resolved {
            binding,
            name,
            param,
        }) = self.registry.resolve(&decl.name, &decl.param)?
        else {
            return self.unknown_tag(document, index, decl, close);
        };
        let convention = binding.convention;
        trace!(
            tag = %name,
            offset = decl.span.start,
            convention = %convention,
            "invoking tag"
        );

        // A one-parameter tag with an empty parameter takes its body instead.
        let param_present = !param.trim().is_empty();
        let body_present = close.is_some();
        let body_as_param = convention.one_param && !param_present && body_present;
        if convention.one_param && param_present && body_present {
            return Err(self.violation(document, decl, Violation::ParamAndBody));
        }
        let (param_present, body_present) = if body_as_param {
            (true, false)
        } else {
            (param_present, body_present)
        };
        self.check_arity(document, decl, &convention, param_present, body_present)?;

        self.call_stack.record(&decl.name);
        let slot = convention.deferred.then(|| self.deferred.reserve());

        let body_text = match close {
            Some(close) if convention.body_mode == BodyMode::Raw => {
                Some(document.raw(index + 1, close, &self.config.delimiters))
            }
            Some(close) => Some(self.eval_range(document, index + 1, close)?),
            None => None,
        };
        let (param, body_text) = if body_as_param {
            (body_text.unwrap_or_default(), None)
        } else {
            (param, body_text)
        };

        let param = decode_param(
            &param,
            convention.param_shape,
            &self.config.delimiters.separator,
        );
        let body = match body_text {
            None => Body::None,
            Some(text) => decode_body(text, convention.body_shape, &self.config.shapes).map_err(
                |message| {
                    self.violation(
                        document,
                        decl,
                        Violation::InvalidBody {
                            shape: convention.body_shape.label().to_string(),
                            message,
                        },
                    )
                },
            )?,
        };

        let call = TagCall {
            name,
            tag: decl.name.clone(),
            param,
            body,
            offset: decl.span.start,
            document: None,
        };

        if let Some(slot) = slot {
            self.deferred.fill(
                slot,
                DeferredEntry {
                    handler: binding.handler,
                    call,
                    convention,
                },
            );
            return Ok(String::new());
        }

        let output = self.call_handler(binding.handler.as_ref(), &call)?;
        if convention.redo {
            return self.expand_nested(&output);
        }
        Ok(output)
    }

    fn check_arity(
        &self,
        document: &Document,
        decl: &TagDecl,
        convention: &Convention,
        param_present: bool,
        body_present: bool,
    ) -> TemplateResult<()> {
        let violation = match (convention.param, param_present) {
            (Arity::Required, false) => Some(Violation::MissingParam),
            (Arity::Forbidden, true) => Some(Violation::UnexpectedParam),
            _ => match (convention.body, body_present) {
                (Arity::Required, false) => Some(Violation::MissingBody),
                (Arity::Forbidden, true) => Some(Violation::UnexpectedBody),
                _ => None,
            },
        };
        match violation {
            Some(violation) => Err(self.violation(document, decl, violation)),
            None => Ok(()),
        }
    }

    fn violation(&self, document: &Document, decl: &TagDecl, violation: Violation) -> TemplateError {
        TemplateError::Convention {
            tag: decl_ref(decl, &self.config.delimiters),
            violation,
            context: source_excerpt(document.source(), decl.span.start, EXCERPT_RADIUS),
        }
    }

    fn call_handler(&mut self, handler: &dyn Handler, call: &TagCall) -> TemplateResult<String> {
        handler.call(self, call).map_err(|err| match err {
            TemplateError::Handler { tag, message } if tag.is_empty() => TemplateError::Handler {
                tag: call.name.clone(),
                message,
            },
            other => other,
        })
    }

    fn unknown_tag(
        &self,
        document: &Document,
        index: usize,
        decl: &TagDecl,
        close: Option<usize>,
    ) -> TemplateResult<String> {
        let delimiters = &self.config.delimiters;
        let tag = decl_ref(decl, delimiters);
        let policy = self.config.engine.unknown_tag;
        if policy == UnknownTagPolicy::Abort {
            return Err(TemplateError::UnknownTag { tag });
        }
        warn!(tag = %tag.decl, offset = tag.offset, ?policy, "no plugin for tag");

        let end = close.map_or(index + 1, |close| close + 1);
        match policy {
            UnknownTagPolicy::Keep => Ok(document.raw(index, end, delimiters)),
            UnknownTagPolicy::Debug => {
                let body = close
                    .map(|close| document.raw(index + 1, close, delimiters))
                    .unwrap_or_default();
                Ok(format!(
                    "[unknown {}]{}[/unknown {}]",
                    self.escaper.escape(&tag.decl),
                    body,
                    decl.name
                ))
            }
            UnknownTagPolicy::Ignore | UnknownTagPolicy::Abort => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper(engine: &mut Engine) {
        engine
            .register_fn(
                "upper",
                Convention::new().no_param().require_body(),
                |_, call| Ok(call.body.text().to_uppercase()),
            )
            .unwrap();
    }

    #[test]
    fn test_literal_text_passes_through() {
        let mut engine = Engine::with_defaults().unwrap();
        assert_eq!(engine.render("plain: text } {").unwrap(), "plain: text } {");
    }

    #[test]
    fn test_body_is_evaluated_before_handler() {
        let mut engine = Engine::with_defaults().unwrap();
        upper(&mut engine);
        engine
            .register_fn("name", Convention::new().no_body(), |_, _| Ok("ada".to_string()))
            .unwrap();
        assert_eq!(
            engine.render("hi {upper:}dear {name:}{:upper}!").unwrap(),
            "hi DEAR ADA!"
        );
    }

    #[test]
    fn test_text_body_is_raw() {
        let mut engine = Engine::with_defaults().unwrap();
        engine
            .register_fn("raw", Convention::new().require_body().text(), |_, call| {
                Ok(call.body.text().to_string())
            })
            .unwrap();
        assert_eq!(
            engine.render("{raw:}{x:1}{y:}z{:y}{:raw}").unwrap(),
            "{x:1}{y:}z{:y}"
        );
    }

    #[test]
    fn test_call_stack_slot_reaches_enclosing_tag() {
        let mut engine = Engine::with_defaults().unwrap();
        engine
            .register_fn("total", Convention::new(), |engine, _| {
                let sum = engine.get_call_stack("total")?;
                Ok(format!("={}", sum.unwrap_or(json!(0))))
            })
            .unwrap();
        engine
            .register_fn("add", Convention::new().require_param(), |engine, call| {
                let current = engine
                    .get_call_stack("total")?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let n: i64 = call.param.text().trim().parse().map_err(|_| {
                    TemplateError::handler(format!("not a number: {}", call.param.text()))
                })?;
                engine.set_call_stack("total", current + n)?;
                Ok(String::new())
            })
            .unwrap();

        assert_eq!(
            engine.render("{total:}{add:2}{add:3}{:total}").unwrap(),
            "=5"
        );
        assert!(engine.call_stack().depth() == 0);
    }

    #[test]
    fn test_handler_error_gets_tag_name() {
        let mut engine = Engine::with_defaults().unwrap();
        engine
            .register_fn("fail", Convention::new(), |_, _| {
                Err(TemplateError::handler("broken"))
            })
            .unwrap();
        let err = engine.render("{fail:}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::Handler {
                tag: "fail".to_string(),
                message: "broken".to_string()
            }
        );
    }

    #[test]
    fn test_expand_outside_evaluation_keeps_document() {
        let mut engine = Engine::with_defaults().unwrap();
        upper(&mut engine);
        engine.load("{upper:}a{:upper}").unwrap();
        assert_eq!(engine.expand("{upper:}b{:upper}").unwrap(), "B");
        assert_eq!(engine.evaluate().unwrap(), "A");
    }

    #[test]
    fn test_placeholders_follow_config() {
        let mut config = EngineConfig::default();
        config.placeholders.prefix = "[[".to_string();
        config.placeholders.suffix = "]]".to_string();
        let engine = Engine::new(config).unwrap();
        assert_eq!(
            engine
                .placeholders()
                .replace_tags("[[who]] {:=who}", &json!({"who": "Bo"})),
            "Bo {:=who}"
        );

        let mut config = EngineConfig::default();
        config.placeholders.suffix = String::new();
        assert!(matches!(Engine::new(config), Err(TemplateError::Config(_))));
    }

    #[test]
    fn test_evaluate_from_handler_stays_nested() {
        let mut engine = Engine::with_defaults().unwrap();
        engine
            .register_fn("again", Convention::new().no_body(), |engine, _| {
                engine.evaluate()
            })
            .unwrap();
        let err = engine.render("{again:}").unwrap_err();
        assert!(matches!(err, TemplateError::RecursionLimit { .. }));
        assert_eq!(engine.call_stack().depth(), 0);
        assert_eq!(engine.render("ok").unwrap(), "ok");
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = EngineConfig::default().with_max_depth(0);
        assert!(matches!(Engine::new(config), Err(TemplateError::Config(_))));
    }
}
