//! Nesting matcher
//!
//! Pairs every open tag with its close tag and classifies each tag segment.
//! Matching runs as a single pass over the close tags: each one scans
//! backwards over the tags at its own level, stepping over pairs that are
//! already closed, for the nearest still-unmatched open tag with the same name
//! (any name for the anonymous `{:}`). Open tags nobody closes are self-closed.
//!
//! A close tag whose only partner sits inside an already closed pair crosses
//! that pair, as in `{a:}{b:}{:a}{:b}`, which is a structural error. A second
//! pass checks that the pairs nest like a stack. Close tags without any
//! partner are not an error, they are left to the engine's dangling-end policy.

use crate::template::config::Delimiters;
use crate::template::error::{TagRef, TemplateError, TemplateResult};
use crate::template::lexer::{Segment, TagDecl};

/// Classification of one tag segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpos {
    /// Not classified yet; an error if it survives matching
    Unresolved,
    /// Self-closed open tag
    NoBody,
    /// Close tag without a matching open tag
    DanglingEnd,
    /// Close tag consumed by a matched pair
    EndMarker,
    /// Open tag whose close tag sits at this segment index
    MatchedEnd(usize),
}

/// Endpos classification for every tag segment of a segment sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndposTable {
    entries: Vec<Option<Endpos>>,
}

impl EndposTable {
    /// Classification of the segment at `index`, `None` for literals.
    pub fn get(&self, index: usize) -> Option<Endpos> {
        self.entries.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the close segment matching the open tag at `index`.
    pub fn matched_end(&self, index: usize) -> Option<usize> {
        match self.get(index) {
            Some(Endpos::MatchedEnd(end)) => Some(end),
            _ => None,
        }
    }
}

/// Classify all tag segments and validate their nesting.
pub fn match_tags(segments: &[Segment], delimiters: &Delimiters) -> TemplateResult<EndposTable> {
    let mut entries: Vec<Option<Endpos>> = segments
        .iter()
        .map(|segment| segment.as_tag().map(|_| Endpos::Unresolved))
        .collect();

    // open index of every matched close tag, used to step over closed pairs
    let mut opened_at: Vec<Option<usize>> = vec![None; segments.len()];

    for (i, segment) in segments.iter().enumerate() {
        let Some(decl) = segment.as_tag() else {
            continue;
        };
        if !decl.is_close() {
            continue;
        }

        entries[i] = Some(Endpos::DanglingEnd);
        let wanted = decl.close_name();
        let accepts =
            |open: &TagDecl| !open.is_close() && (wanted.is_empty() || open.name == wanted);

        let mut skipped: Vec<(usize, usize)> = Vec::new();
        let mut candidate = None;
        let mut j = i;
        while j > 0 {
            j -= 1;
            match entries[j] {
                Some(Endpos::EndMarker) => {
                    if let Some(open) = opened_at[j] {
                        skipped.push((open, j));
                        j = open;
                    }
                }
                Some(Endpos::Unresolved) => {
                    if segments[j].as_tag().is_some_and(accepts) {
                        candidate = Some(j);
                        break;
                    }
                }
                _ => {}
            }
        }

        match candidate {
            Some(open) => {
                entries[open] = Some(Endpos::MatchedEnd(i));
                entries[i] = Some(Endpos::EndMarker);
                opened_at[i] = Some(open);
            }
            None => {
                // A partner buried inside an already closed pair means the
                // two pairs cross.
                let crossing = skipped.iter().find_map(|&(open, close)| {
                    (open + 1..close)
                        .rev()
                        .find(|&k| {
                            entries[k] == Some(Endpos::Unresolved)
                                && segments[k].as_tag().is_some_and(accepts)
                        })
                        .map(|inner| (open, inner))
                });
                if let Some((outer, inner)) = crossing {
                    return Err(TemplateError::Nesting {
                        outer: tag_ref(segments, outer, delimiters),
                        inner: tag_ref(segments, inner, delimiters),
                    });
                }
            }
        }
    }

    for entry in entries.iter_mut() {
        if *entry == Some(Endpos::Unresolved) {
            *entry = Some(Endpos::NoBody);
        }
    }

    check_nesting(segments, &entries, delimiters)?;
    Ok(EndposTable { entries })
}

/// Verify matched pairs do not cross, keeping a stack of open pairs whose
/// close index bounds every pair opened inside them.
fn check_nesting(
    segments: &[Segment],
    entries: &[Option<Endpos>],
    delimiters: &Delimiters,
) -> TemplateResult<()> {
    let mut open: Vec<(usize, usize)> = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        while let Some(&(_, close)) = open.last() {
            if close <= i {
                open.pop();
            } else {
                break;
            }
        }

        if let Some(Endpos::MatchedEnd(close)) = *entry {
            if let Some(&(outer, outer_close)) = open.last() {
                if close > outer_close {
                    return Err(TemplateError::Nesting {
                        outer: tag_ref(segments, outer, delimiters),
                        inner: tag_ref(segments, i, delimiters),
                    });
                }
            }
            open.push((i, close));
        }
    }

    Ok(())
}

pub(crate) fn tag_ref(segments: &[Segment], index: usize, delimiters: &Delimiters) -> TagRef {
    match segments.get(index).and_then(Segment::as_tag) {
        Some(decl) => decl_ref(decl, delimiters),
        None => TagRef::new("", 0),
    }
}

pub(crate) fn decl_ref(decl: &TagDecl, delimiters: &Delimiters) -> TagRef {
    TagRef::new(delimiters.wrap(&decl.name, &decl.param), decl.span.start)
}
