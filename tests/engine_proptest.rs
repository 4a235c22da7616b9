//! Property-based tests for lexing, matching, escaping and expansion

use lex_template::template::lexer::{Lexer, Segment};
use lex_template::template::matcher::{match_tags, Endpos};
use lex_template::template::{Convention, Delimiters, Engine};
use proptest::prelude::*;

fn lexer() -> Lexer {
    Lexer::new(Delimiters::default()).unwrap()
}

/// Engine where `a`, `b` and `c` return their body unchanged.
fn identity_engine() -> Engine {
    let mut engine = Engine::with_defaults().unwrap();
    for name in ["a", "b", "c"] {
        engine
            .register_fn(name, Convention::new(), |_, call| {
                Ok(call.body.text().to_string())
            })
            .unwrap();
    }
    engine
}

/// Well-nested tag trees over the names `a`, `b` and `c`.
fn nested_tags() -> impl Strategy<Value = String> {
    let leaf = "[a-z .]{0,6}";
    leaf.prop_recursive(4, 32, 4, |inner| {
        (
            prop::sample::select(vec!["a", "b", "c"]),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, parts)| format!("{{{}:}}{}{{:{}}}", name, parts.concat(), name))
    })
}

fn literal_text(source: &str) -> String {
    lexer()
        .tokenize(source)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Literal(text) => Some(text),
            Segment::Tag(_) => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn tag_free_text_is_unchanged(text in "[a-zA-Z0-9 :}.,\n-]{0,64}") {
        let mut engine = Engine::with_defaults().unwrap();
        prop_assert_eq!(engine.render(text.clone()).unwrap(), text);
    }

    #[test]
    fn braces_without_separator_are_unchanged(text in "[a-z {}]{0,64}") {
        let mut engine = Engine::with_defaults().unwrap();
        prop_assert_eq!(engine.render(text.clone()).unwrap(), text);
    }

    #[test]
    fn escape_roundtrip(text in "[a-z{}:. ]{0,48}") {
        let engine = Engine::with_defaults().unwrap();
        let escaped = engine.escape(&text);
        prop_assert_eq!(engine.unescape(&escaped), text);
    }

    #[test]
    fn lexer_reconstructs_input(text in "[a-z{}:_ ]{0,64}") {
        let lexer = lexer();
        let segments = lexer.tokenize(&text);
        prop_assert!(matches!(segments.first(), Some(Segment::Literal(_))));
        prop_assert!(matches!(segments.last(), Some(Segment::Literal(_))));
        prop_assert_eq!(lexer.detokenize(&segments), text);
    }

    #[test]
    fn nested_pairs_point_at_end_markers(parts in prop::collection::vec(nested_tags(), 0..4)) {
        let source = parts.concat();
        let segments = lexer().tokenize(&source);
        let table = match_tags(&segments, &Delimiters::default()).unwrap();
        for index in 0..segments.len() {
            if let Some(Endpos::MatchedEnd(end)) = table.get(index) {
                prop_assert!(end > index);
                prop_assert_eq!(table.get(end), Some(Endpos::EndMarker));
            }
        }
    }

    #[test]
    fn identity_tags_leave_only_literals(parts in prop::collection::vec(nested_tags(), 0..4)) {
        let source = parts.concat();
        let mut engine = identity_engine();
        prop_assert_eq!(engine.render(source.clone()).unwrap(), literal_text(&source));
    }
}
