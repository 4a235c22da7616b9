//! Error types for template expansion
//!
//! Every failure the engine can report is a [`TemplateError`]. Structural and
//! convention errors carry the offending tag as written in the source, plus
//! its byte offset, so messages can point back into the document.

use std::fmt;

/// A tag declaration as written in the source, with its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub decl: String,
    pub offset: usize,
}

impl TagRef {
    pub fn new(decl: impl Into<String>, offset: usize) -> Self {
        TagRef {
            decl: decl.into(),
            offset,
        }
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' at byte {}", self.decl, self.offset)
    }
}

/// The calling-convention rule a tag invocation broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingParam,
    UnexpectedParam,
    MissingBody,
    UnexpectedBody,
    /// A one-parameter tag was given both a parameter and a body
    ParamAndBody,
    /// The body could not be decoded into the declared shape
    InvalidBody { shape: String, message: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingParam => write!(f, "parameter is required"),
            Violation::UnexpectedParam => write!(f, "parameter is not allowed"),
            Violation::MissingBody => write!(f, "body is required"),
            Violation::UnexpectedBody => write!(f, "body is not allowed"),
            Violation::ParamAndBody => write!(f, "use either parameter or body, not both"),
            Violation::InvalidBody { shape, message } => {
                write!(f, "body is not a valid {}: {}", shape, message)
            }
        }
    }
}

/// Errors that can occur while loading, matching or expanding a template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Invalid delimiters or configuration
    Config(String),
    /// Reading a template source failed
    Io(String),
    /// `inner` opens inside `outer` but closes after it
    Nesting { outer: TagRef, inner: TagRef },
    /// A tag survived matching without a classification
    Unresolved { tag: TagRef },
    /// No plugin is registered for the tag (abort policy)
    UnknownTag { tag: TagRef },
    /// The tag invocation does not fit the plugin's calling convention
    Convention {
        tag: TagRef,
        violation: Violation,
        context: String,
    },
    /// A convention was rejected at registration time
    InvalidConvention { tag: String, message: String },
    /// No enclosing invocation with this name is on the call stack
    CallStackMiss { name: String },
    /// Required variable is missing
    VariableMissing { path: String },
    /// Variable already exists and must not be overwritten
    VariableExists { path: String },
    /// Variable path runs through a non-map value or cannot be appended to
    VariableConflict { path: String, message: String },
    /// Nesting or redo depth exceeded the configured limit
    RecursionLimit { limit: usize },
    /// Error raised by plugin code
    Handler { tag: String, message: String },
}

impl TemplateError {
    /// Convenience constructor for plugin code. The tag is filled in by the
    /// engine when the error leaves the handler.
    pub fn handler(message: impl Into<String>) -> Self {
        TemplateError::Handler {
            tag: String::new(),
            message: message.into(),
        }
    }

    /// Whether this error reports malformed tag structure
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TemplateError::Nesting { .. } | TemplateError::Unresolved { .. }
        )
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            TemplateError::Io(msg) => write!(f, "IO error: {}", msg),
            TemplateError::Nesting { outer, inner } => write!(
                f,
                "Invalid nesting: {} opens inside {} but closes after it",
                inner, outer
            ),
            TemplateError::Unresolved { tag } => {
                write!(f, "Unresolved tag {}", tag)
            }
            TemplateError::UnknownTag { tag } => write!(f, "Unknown tag {}", tag),
            TemplateError::Convention {
                tag,
                violation,
                context,
            } => {
                write!(f, "Invalid call of {}: {}", tag, violation)?;
                if !context.is_empty() {
                    write!(f, " (near \"{}\")", context)?;
                }
                Ok(())
            }
            TemplateError::InvalidConvention { tag, message } => {
                write!(f, "Invalid convention for tag '{}': {}", tag, message)
            }
            TemplateError::CallStackMiss { name } => {
                write!(f, "No enclosing '{}' invocation on the call stack", name)
            }
            TemplateError::VariableMissing { path } => {
                write!(f, "Missing required variable '{}'", path)
            }
            TemplateError::VariableExists { path } => {
                write!(f, "Variable '{}' already exists", path)
            }
            TemplateError::VariableConflict { path, message } => {
                write!(f, "Variable '{}': {}", path, message)
            }
            TemplateError::RecursionLimit { limit } => {
                write!(f, "Maximum expansion depth of {} exceeded", limit)
            }
            TemplateError::Handler { tag, message } => {
                if tag.is_empty() {
                    write!(f, "{}", message)
                } else {
                    write!(f, "Tag '{}' failed: {}", tag, message)
                }
            }
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<std::io::Error> for TemplateError {
    fn from(err: std::io::Error) -> Self {
        TemplateError::Io(err.to_string())
    }
}

impl From<::config::ConfigError> for TemplateError {
    fn from(err: ::config::ConfigError) -> Self {
        TemplateError::Config(err.to_string())
    }
}

/// Result type used throughout the template engine
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Cut a short single-line excerpt of `source` around `offset`.
///
/// Used to give convention errors some nearby text to point at.
pub fn source_excerpt(source: &str, offset: usize, radius: usize) -> String {
    let offset = offset.min(source.len());
    let mut start = offset.saturating_sub(radius);
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (offset + radius).min(source.len());
    while !source.is_char_boundary(end) {
        end += 1;
    }

    let mut excerpt = String::new();
    if start > 0 {
        excerpt.push_str("...");
    }
    excerpt.push_str(&source[start..end].replace('\n', "\\n"));
    if end < source.len() {
        excerpt.push_str("...");
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting_message_names_both_tags() {
        let err = TemplateError::Nesting {
            outer: TagRef::new("{a:}", 0),
            inner: TagRef::new("{b:}", 4),
        };
        let msg = err.to_string();
        assert!(msg.contains("'{a:}' at byte 0"));
        assert!(msg.contains("'{b:}' at byte 4"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_handler_error_without_tag() {
        let err = TemplateError::handler("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_structural());
    }

    #[test]
    fn test_source_excerpt() {
        let source = "line one\nline two with a tag here";
        let excerpt = source_excerpt(source, 10, 5);
        assert_eq!(excerpt, "...one\\nline t...");
    }

    #[test]
    fn test_source_excerpt_whole_text() {
        assert_eq!(source_excerpt("short", 2, 40), "short");
    }

    #[test]
    fn test_source_excerpt_multibyte() {
        let excerpt = source_excerpt("ääää", 3, 1);
        assert!(excerpt.contains('ä'));
    }
}
