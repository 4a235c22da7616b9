//! # lex-template
//!
//! A nested-tag template expansion engine. Text containing tags such as
//! `{upper:}hello{:upper}` is expanded by dispatching every tag to a handler
//! registered for its name and splicing the handler's output back into the
//! surrounding text.
//!
//! ```text
//! let mut engine = Engine::with_defaults()?;
//! engine.register_fn("upper", "NO_PARAM|REQUIRE_BODY".parse()?, |_, call| {
//!     Ok(call.body.text().to_uppercase())
//! })?;
//! assert_eq!(engine.render("{upper:}hello{:upper}")?, "HELLO");
//! ```
//!
//! See the [`template`] module for the components.

pub mod template;
