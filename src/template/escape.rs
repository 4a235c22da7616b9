//! Tag escaping
//!
//! `escape` rewrites every tag declaration in a text with the escaped
//! delimiters (`{a:b}` becomes `&#123;a&#58;b&#125;`) so a later expansion
//! pass sees plain text. `unescape` restores exactly those declarations.
//! Text outside declarations is never touched.

use crate::template::config::Delimiters;
use crate::template::error::{TemplateError, TemplateResult};
use crate::template::lexer::{Lexer, Segment, NAME_CLASS};
use regex::{Captures, Regex};

#[derive(Debug, Clone)]
pub struct Escaper {
    lexer: Lexer,
    escaped_tag: Regex,
}

impl Escaper {
    pub fn new(delimiters: Delimiters) -> TemplateResult<Self> {
        let escaped = &delimiters.escaped;
        let source = format!(
            r"(?s){}({}){}(.*?){}",
            regex::escape(&escaped.prefix),
            NAME_CLASS,
            regex::escape(&escaped.separator),
            regex::escape(&escaped.suffix)
        );
        let escaped_tag = Regex::new(&source).map_err(|e| TemplateError::Config(e.to_string()))?;
        Ok(Escaper {
            lexer: Lexer::new(delimiters)?,
            escaped_tag,
        })
    }

    fn delimiters(&self) -> &Delimiters {
        self.lexer.delimiters()
    }

    pub fn escape(&self, text: &str) -> String {
        let d = self.delimiters();
        let mut out = String::with_capacity(text.len());
        for segment in self.lexer.tokenize(text) {
            match segment {
                Segment::Literal(literal) => out.push_str(&literal),
                Segment::Tag(decl) => {
                    out.push_str(&d.escaped.prefix);
                    out.push_str(&decl.name);
                    out.push_str(&d.escaped.separator);
                    out.push_str(&decl.param.replace(&d.separator, &d.escaped.separator));
                    out.push_str(&d.escaped.suffix);
                }
            }
        }
        out
    }

    pub fn unescape(&self, text: &str) -> String {
        let d = self.delimiters();
        self.escaped_tag
            .replace_all(text, |caps: &Captures| {
                let name = caps.get(1).map_or("", |m| m.as_str());
                let param = caps.get(2).map_or("", |m| m.as_str());
                d.wrap(name, &param.replace(&d.escaped.separator, &d.separator))
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escaper() -> Escaper {
        Escaper::new(Delimiters::default()).unwrap()
    }

    #[test]
    fn test_escape_tag() {
        assert_eq!(escaper().escape("x{a:b:c}y"), "x&#123;a&#58;b&#58;c&#125;y");
    }

    #[test]
    fn test_escape_leaves_plain_text() {
        let text = "a: {b} c:d }{";
        assert_eq!(escaper().escape(text), text);
    }

    #[test]
    fn test_unescape_restores() {
        let e = escaper();
        let text = "{upper:}x{:upper} and {:} and {row:init:1}";
        let escaped = e.escape(text);
        assert!(!escaped.contains('{'));
        assert_eq!(e.unescape(&escaped), text);
    }

    #[test]
    fn test_unescape_ignores_lone_entities() {
        let text = "&#58; &#123; alone";
        assert_eq!(escaper().unescape(text), text);
    }
}
