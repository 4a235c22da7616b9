//! Tag lexer
//!
//! Splits template text into an alternating sequence of literal segments and
//! tag declarations. A declaration is `prefix name separator param suffix`
//! (e.g. `{name:param}`); a declaration without a name (`{:name}`, `{:}`) is
//! a close tag.
//!
//! The split is a capturing split, so the sequence always starts and ends
//! with a literal (possibly empty) and literals sit at even indices, tags at
//! odd ones. Rewrapping every tag reproduces the input exactly.

use crate::template::config::Delimiters;
use crate::template::error::{TemplateError, TemplateResult};
use regex::Regex;
use std::ops::Range;

/// A tag declaration found between delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDecl {
    pub name: String,
    pub param: String,
    /// Byte range of the whole declaration (delimiters included)
    pub span: Range<usize>,
}

impl TagDecl {
    /// Close tags are written with an empty name: `{:name}` or `{:}`.
    pub fn is_close(&self) -> bool {
        self.name.is_empty()
    }

    /// Name of the tag a close declaration refers to (empty for `{:}`).
    pub fn close_name(&self) -> &str {
        self.param.trim()
    }
}

/// One atomic unit of lexed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Tag(TagDecl),
}

impl Segment {
    pub fn as_tag(&self) -> Option<&TagDecl> {
        match self {
            Segment::Tag(decl) => Some(decl),
            Segment::Literal(_) => None,
        }
    }
}

/// Lexer for one delimiter triple.
#[derive(Debug, Clone)]
pub struct Lexer {
    delimiters: Delimiters,
    pattern: Regex,
}

impl Lexer {
    pub fn new(delimiters: Delimiters) -> TemplateResult<Self> {
        delimiters.validate()?;
        let pattern = tag_pattern(
            &delimiters.prefix,
            &delimiters.separator,
            &delimiters.suffix,
        )?;
        Ok(Lexer {
            delimiters,
            pattern,
        })
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Split `text` into segments.
    pub fn tokenize(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in self.pattern.captures_iter(text) {
            // group 0 always exists for a match
            let Some(whole) = caps.get(0) else { continue };
            segments.push(Segment::Literal(text[last..whole.start()].to_string()));
            let name = caps.get(1).map_or("", |m| m.as_str());
            let param = caps.get(2).map_or("", |m| m.as_str());
            segments.push(Segment::Tag(TagDecl {
                name: name.to_string(),
                param: param.to_string(),
                span: whole.range(),
            }));
            last = whole.end();
        }

        segments.push(Segment::Literal(text[last..].to_string()));
        segments
    }

    /// Write segments back out as text. Inverse of [`Lexer::tokenize`].
    pub fn detokenize(&self, segments: &[Segment]) -> String {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Tag(decl) => out.push_str(&self.delimiters.wrap(&decl.name, &decl.param)),
            }
        }
        out
    }

    /// Cheap check whether `text` contains an open tag called `name`.
    pub fn has_tag(&self, text: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let open = format!("{}{}{}", self.delimiters.prefix, name, self.delimiters.separator);
        text.match_indices(&open).any(|(pos, _)| {
            self.pattern
                .find_at(text, pos)
                .is_some_and(|m| m.start() == pos)
        })
    }
}

/// Characters allowed in tag names.
pub(crate) const NAME_CLASS: &str = r"[A-Za-z0-9_.\-]*";

/// Build the declaration regex for a delimiter triple.
///
/// The parameter may not contain the first character of the prefix or the
/// suffix, so `{a:{b:}}` lexes `{b:}` as the tag and the outer braces as text.
pub(crate) fn tag_pattern(prefix: &str, separator: &str, suffix: &str) -> TemplateResult<Regex> {
    let excluded = class_chars(&[prefix, suffix]);
    let source = format!(
        r"(?s){}({}){}([^{}]*?){}",
        regex::escape(prefix),
        NAME_CLASS,
        regex::escape(separator),
        excluded,
        regex::escape(suffix)
    );
    Regex::new(&source).map_err(|e| TemplateError::Config(e.to_string()))
}

fn class_chars(delimiters: &[&str]) -> String {
    let mut class = String::new();
    for delimiter in delimiters {
        if let Some(ch) = delimiter.chars().next() {
            class.push_str(&regex::escape(&ch.to_string()));
        }
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer() -> Lexer {
        Lexer::new(Delimiters::default()).unwrap()
    }

    fn tag(name: &str, param: &str) -> (String, String) {
        (name.to_string(), param.to_string())
    }

    fn tags(segments: &[Segment]) -> Vec<(String, String)> {
        segments
            .iter()
            .filter_map(Segment::as_tag)
            .map(|d| (d.name.clone(), d.param.clone()))
            .collect()
    }

    #[test]
    fn test_plain_text_is_one_literal() {
        let segments = lexer().tokenize("hello world");
        assert_eq!(segments, vec![Segment::Literal("hello world".to_string())]);
    }

    #[test]
    fn test_empty_input() {
        let segments = lexer().tokenize("");
        assert_eq!(segments, vec![Segment::Literal(String::new())]);
    }

    #[test]
    fn test_alternates_literal_and_tag() {
        let segments = lexer().tokenize("{upper:}hello{:upper}");
        assert_eq!(segments.len(), 5);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(i % 2 == 1, segment.as_tag().is_some(), "segment {}", i);
        }
        assert_eq!(tags(&segments), vec![tag("upper", ""), tag("", "upper")]);
    }

    #[test]
    fn test_param_keeps_further_separators() {
        let segments = lexer().tokenize("{row:init:x}");
        assert_eq!(tags(&segments), vec![tag("row", "init:x")]);
    }

    #[test]
    fn test_anonymous_close() {
        let segments = lexer().tokenize("{a:}x{:}");
        assert!(segments[3].as_tag().unwrap().is_close());
        assert_eq!(segments[3].as_tag().unwrap().close_name(), "");
    }

    #[test]
    fn test_braces_without_separator_are_text() {
        let segments = lexer().tokenize("fn main() { x }");
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_nested_prefix_splits_at_innermost() {
        let segments = lexer().tokenize("{a:{b:}}");
        assert_eq!(tags(&segments), vec![tag("b", "")]);
        assert_eq!(segments[0], Segment::Literal("{a:".to_string()));
        assert_eq!(segments[2], Segment::Literal("}".to_string()));
    }

    #[test]
    fn test_spans_cover_declarations() {
        let text = "ab{x:1}cd";
        let segments = lexer().tokenize(text);
        let decl = segments[1].as_tag().unwrap();
        assert_eq!(&text[decl.span.clone()], "{x:1}");
    }

    #[test]
    fn test_roundtrip() {
        let l = lexer();
        let text = "a{b:c}d{:b}{e:}{:}{ not a tag } x:y";
        assert_eq!(l.detokenize(&l.tokenize(text)), text);
    }

    #[test]
    fn test_custom_delimiters() {
        let mut delimiters = Delimiters::default();
        delimiters.prefix = "[[".to_string();
        delimiters.suffix = "]]".to_string();
        let l = Lexer::new(delimiters).unwrap();
        let segments = l.tokenize("[[upper:]]x[[:upper]] {a:}");
        assert_eq!(tags(&segments), vec![tag("upper", ""), tag("", "upper")]);
        assert_eq!(l.detokenize(&segments), "[[upper:]]x[[:upper]] {a:}");
    }

    #[test]
    fn test_has_tag() {
        let l = lexer();
        assert!(l.has_tag("x {upper:}y{:upper}", "upper"));
        assert!(!l.has_tag("x {upper:}y{:upper}", "lower"));
        assert!(!l.has_tag("{upper: no close", "upper"));
        assert!(!l.has_tag("x {upper:}y{:upper}", ""));
    }
}
