use logos::Logos;

/// Lexical elements of a data set query, as far as parameter substitution cares.
/// Anything that is not a placeholder, an optional fragment bracket or a string literal
/// is passed through as text.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLex<'q> {
    /// `${name}` or `${Band.field}`. Carries the name without the braces.
    #[regex(r"\$\{[A-Za-z_][A-Za-z0-9_.]*\}", |lex| {
        let s = lex.slice();
        &s[2..s.len() - 1]
    })]
    Placeholder(&'q str),

    #[token("[[")]
    OptionalStart,

    #[token("]]")]
    OptionalEnd,

    /// Single-quoted literal, with `''` as the escaped quote. Placeholders inside are
    /// not substituted.
    #[regex(r"'([^']|'')*'")]
    Literal,

    #[regex(r"[^$\['\]]+")]
    Text,

    /// Lone `$`, `[` or `]` that did not start anything above.
    #[token("$")]
    #[token("[")]
    #[token("]")]
    Punct,
}
