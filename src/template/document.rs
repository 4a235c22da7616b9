//! Loaded template source
//!
//! A [`Document`] keeps the source text together with its lexed segments and
//! endpos table. Both are computed once when the text is loaded and are
//! replaced together when new text is loaded.

use crate::template::config::Delimiters;
use crate::template::error::TemplateResult;
use crate::template::lexer::{Lexer, Segment, TagDecl};
use crate::template::matcher::{match_tags, Endpos, EndposTable};

#[derive(Debug, Clone, Default)]
pub struct Document {
    source: String,
    segments: Vec<Segment>,
    endpos: EndposTable,
}

impl Document {
    /// Lex and match `source`.
    pub fn parse(source: impl Into<String>, lexer: &Lexer) -> TemplateResult<Self> {
        let source = source.into();
        let segments = lexer.tokenize(&source);
        let endpos = match_tags(&segments, lexer.delimiters())?;
        Ok(Document {
            source,
            segments,
            endpos,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn endpos(&self) -> &EndposTable {
        &self.endpos
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn decl(&self, index: usize) -> Option<&TagDecl> {
        self.segments.get(index).and_then(Segment::as_tag)
    }

    pub fn classification(&self, index: usize) -> Option<Endpos> {
        self.endpos.get(index)
    }

    /// Number of tag declarations in the document.
    pub fn tag_count(&self) -> usize {
        self.segments.len() / 2
    }

    /// Source text of segments `[start, end)`, tags rewrapped in delimiters.
    pub fn raw(&self, start: usize, end: usize, delimiters: &Delimiters) -> String {
        let end = end.min(self.segments.len());
        let mut out = String::new();
        for segment in self.segments.iter().take(end).skip(start) {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Tag(decl) => out.push_str(&delimiters.wrap(&decl.name, &decl.param)),
            }
        }
        out
    }
}
