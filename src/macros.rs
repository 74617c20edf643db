//! Helper macros for the lexer.
//!
//! `MK_TOKEN!` builds a Token value and `MK_DEFAULT_HANDLER!` builds a
//! handler for fixed-text tokens, so the pattern table in the lexer stays
//! one line per token.

/// Creates a Token from a kind, string value and span.
#[macro_export]
macro_rules! MK_TOKEN {
    ($kind:expr, $value:expr, $span:expr) => {
        Token {
            kind: $kind,
            value: $value,
            span: $span,
        }
    };
}

/// Creates a lexer handler for a token whose text is a fixed literal.
///
/// The generated handler pushes a token of the given kind and advances the
/// lexer by the literal's length.
#[macro_export]
macro_rules! MK_DEFAULT_HANDLER {
    ($kind:expr, $value:literal) => {
        |lexer: &mut Lexer, _regex: Regex| {
            lexer.push(MK_TOKEN!(
                $kind,
                String::from($value),
                Span {
                    start: Position(lexer.pos as u32, Rc::clone(&lexer.file)),
                    end: Position(
                        (lexer.pos + $value.len() as i32) as u32,
                        Rc::clone(&lexer.file)
                    )
                }
            ));
            lexer.advance_n($value.len().try_into().unwrap());
        }
    };
}
