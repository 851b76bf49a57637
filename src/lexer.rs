//! Splits source text into [`Token`]s, lazily and one at a time.
//!
//! Token shapes that never change (numbers, strings, identifiers, brackets) come from
//! a [`logos`] lexer. Operators and modifiers are only known at runtime, so they are
//! matched by longest prefix against the sets handed to [`Tokenizer::new`].

use std::fmt;

pub use logos::Span;
use logos::{Lexer, Logos};

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("malformed string literal at offset {offset}")]
    MalformedString { offset: usize },
    #[error("invalid escape sequence '\\{escape}' at offset {offset}")]
    InvalidEscape { escape: char, offset: usize },
    #[error("invalid unicode codepoint {codepoint:#x} at offset {offset}")]
    InvalidCodepoint { codepoint: u32, offset: usize },
    #[error("failed to parse: '{remaining}'")]
    UnknownToken { remaining: Box<str>, offset: usize },
}

impl LexError {
    /// Byte offset into the source where the error was detected.
    pub fn offset(&self) -> Option<usize> {
        match self {
            LexError::Invalid => None,
            LexError::MalformedString { offset }
            | LexError::InvalidEscape { offset, .. }
            | LexError::InvalidCodepoint { offset, .. }
            | LexError::UnknownToken { offset, .. } => Some(*offset),
        }
    }

    /// Source range to point at: the first unparsed character, or the opening quote of
    /// a broken string.
    pub fn span(&self) -> Option<Span> {
        let width = match self {
            LexError::UnknownToken { remaining, .. } => remaining.chars().next().map_or(1, char::len_utf8),
            _ => 1,
        };
        self.offset().map(|offset| offset..offset + width)
    }

    fn shifted(self, base: usize) -> Self {
        match self {
            LexError::Invalid => LexError::Invalid,
            LexError::MalformedString { offset } => LexError::MalformedString {
                offset: offset + base,
            },
            LexError::InvalidEscape { escape, offset } => LexError::InvalidEscape {
                escape,
                offset: offset + base,
            },
            LexError::InvalidCodepoint { codepoint, offset } => LexError::InvalidCodepoint {
                codepoint,
                offset: offset + base,
            },
            LexError::UnknownToken { remaining, offset } => LexError::UnknownToken {
                remaining,
                offset: offset + base,
            },
        }
    }
}

fn read_code_point(
    chars: &mut std::str::Chars<'_>,
    digits: usize,
    offset: usize,
) -> Result<char, LexError> {
    let mut codepoint = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or(LexError::MalformedString { offset })?;
        codepoint = codepoint * 16 + digit;
    }
    char::from_u32(codepoint).ok_or(LexError::InvalidCodepoint { codepoint, offset })
}

fn process_string(lexer: &mut Lexer<Lexeme>) -> Result<Box<str>, LexError> {
    let slice = lexer.slice();
    let offset = lexer.span().start;
    let mut unescaped = String::new();

    // delimiters are always a single ascii quote
    let mut chars = slice[1..slice.len() - 1].chars();
    while let Some(chr) = chars.next() {
        match chr {
            '\\' => match chars.next() {
                Some('\\') => unescaped.push('\\'),
                Some('"') => unescaped.push('"'),
                Some('\'') => unescaped.push('\''),
                Some('n') => unescaped.push('\n'),
                Some('r') => unescaped.push('\r'),
                Some('t') => unescaped.push('\t'),
                Some('0') => unescaped.push('\0'),
                Some('b') => unescaped.push('\x08'),
                Some('f') => unescaped.push('\x0c'),
                Some('x') => unescaped.push(read_code_point(&mut chars, 2, offset)?),
                Some('u') => unescaped.push(read_code_point(&mut chars, 4, offset)?),
                Some(escape) => Err(LexError::InvalidEscape { escape, offset })?,
                None => Err(LexError::MalformedString { offset })?,
            },
            c => unescaped.push(c),
        }
    }

    Ok(unescaped.into_boxed_str())
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexError)]
enum Lexeme {
    #[regex(r#""(\\.|[^"\\])*""#, process_string)]
    #[regex(r#"'(\\.|[^'\\])*'"#, process_string)]
    String(Box<str>),

    #[regex(r"[\(\[\{]")]
    LeftBracket,
    #[regex(r"[\)\]\}]")]
    RightBracket,
    #[token(",")]
    Separator,

    #[regex(r"[_A-Za-z][_0-9A-Za-z]*")]
    Symbol,
    #[regex(r"[_A-Za-z][_0-9A-Za-z]*\$[0-9]*,?[0-9]*")]
    SymbolWithArgs,

    #[regex(r"[0-9](_*[0-9]+)*(\.[0-9](_*[0-9]+)*)?", priority = 3)]
    DecNumber,
    #[regex(r"0x[0-9A-Fa-f](_*[0-9A-Fa-f]+)*(\.[0-9A-Fa-f](_*[0-9A-Fa-f]+)*)?")]
    HexNumber,
    // "017" is octal, "08" stays decimal
    #[regex(r"0(_*[0-7]+)+(\.[0-7](_*[0-7]+)*)?", priority = 5)]
    OctNumber,
    #[regex(r"0b[01](_*[01]+)*(\.[01](_*[01]+)*)?")]
    BinNumber,
    #[regex(
        r#"[0-9]+#[0-9A-Za-z'"](_*[0-9A-Za-z'"]+)*(\.[0-9A-Za-z'"](_*[0-9A-Za-z'"]+)*)?"#
    )]
    QuotedNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    DecNumber,
    HexNumber,
    OctNumber,
    BinNumber,
    QuotedNumber,
    String,
    Symbol,
    SymbolWithArgs,
    Operator,
    Modifier,
    LeftBracket,
    RightBracket,
    Separator,
}

impl TokenKind {
    /// Whether tokens of this kind are handed to a value parser.
    pub fn is_value(self) -> bool {
        matches!(
            self,
            TokenKind::DecNumber
                | TokenKind::HexNumber
                | TokenKind::OctNumber
                | TokenKind::BinNumber
                | TokenKind::QuotedNumber
                | TokenKind::String
        )
    }

    pub fn is_number(self) -> bool {
        self.is_value() && self != TokenKind::String
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::DecNumber => "decimal number",
            TokenKind::HexNumber => "hexadecimal number",
            TokenKind::OctNumber => "octal number",
            TokenKind::BinNumber => "binary number",
            TokenKind::QuotedNumber => "quoted number",
            TokenKind::String => "string",
            TokenKind::Symbol => "symbol",
            TokenKind::SymbolWithArgs => "symbol with arguments",
            TokenKind::Operator => "operator",
            TokenKind::Modifier => "modifier",
            TokenKind::LeftBracket => "left bracket",
            TokenKind::RightBracket => "right bracket",
            TokenKind::Separator => "separator",
        };
        f.write_str(name)
    }
}

/// A classified piece of source text.
///
/// For strings `text` holds the unescaped contents, for everything else it is the
/// exact source slice covered by `span`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Box<str>,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.text, self.kind)
    }
}

/// Longest first, ties broken lexically.
fn by_length<I>(words: I) -> Vec<Box<str>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut words: Vec<Box<str>> = words
        .into_iter()
        .map(|w| Box::from(w.as_ref()))
        .filter(|w: &Box<str>| !w.is_empty())
        .collect();
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    words.dedup();
    words
}

fn find_prefix(rest: &str, words: &[Box<str>]) -> Option<usize> {
    words
        .iter()
        .find(|word| rest.starts_with(word.as_ref()))
        .map(|word| word.len())
}

/// Lazy token iterator over a source string.
///
/// Iteration ends after the first error.
pub struct Tokenizer<'s> {
    source: &'s str,
    offset: usize,
    operators: Vec<Box<str>>,
    modifiers: Vec<Box<str>>,
    failed: bool,
}

impl<'s> Tokenizer<'s> {
    pub fn new<O, M>(source: &'s str, operators: O, modifiers: M) -> Self
    where
        O: IntoIterator,
        O::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            source,
            offset: 0,
            operators: by_length(operators),
            modifiers: by_length(modifiers),
            failed: false,
        }
    }

    /// Source text not yet consumed.
    pub fn remaining(&self) -> &'s str {
        &self.source[self.offset..]
    }

    fn emit(&mut self, kind: TokenKind, len: usize) -> Token {
        let span = self.offset..self.offset + len;
        self.offset += len;
        Token::new(kind, &self.source[span.clone()], span)
    }

    fn read_token(&mut self, rest: &'s str) -> Result<Token, LexError> {
        let mut lexer = Lexeme::lexer(rest);
        let lexeme = lexer.next();
        let len = lexer.span().end;

        match lexeme {
            Some(Ok(Lexeme::String(text))) => {
                let span = self.offset..self.offset + len;
                self.offset += len;
                Ok(Token {
                    kind: TokenKind::String,
                    text,
                    span,
                })
            }
            Some(Err(err)) if rest.starts_with(['"', '\'']) => Err(match err {
                LexError::Invalid => LexError::MalformedString { offset: self.offset },
                err => err.shifted(self.offset),
            }),
            Some(Ok(Lexeme::LeftBracket)) => Ok(self.emit(TokenKind::LeftBracket, len)),
            Some(Ok(Lexeme::RightBracket)) => Ok(self.emit(TokenKind::RightBracket, len)),
            Some(Ok(Lexeme::Separator)) => Ok(self.emit(TokenKind::Separator, len)),
            Some(Ok(lexeme @ (Lexeme::Symbol | Lexeme::SymbolWithArgs))) => {
                // a keyword-like operator wins when it covers the whole identifier
                let ident_len = rest[..len].find('$').unwrap_or(len);
                if let Some(len) = find_prefix(rest, &self.modifiers).filter(|l| *l >= ident_len) {
                    return Ok(self.emit(TokenKind::Modifier, len));
                }
                if let Some(len) = find_prefix(rest, &self.operators).filter(|l| *l >= ident_len) {
                    return Ok(self.emit(TokenKind::Operator, len));
                }
                let kind = match lexeme {
                    Lexeme::SymbolWithArgs => TokenKind::SymbolWithArgs,
                    _ => TokenKind::Symbol,
                };
                Ok(self.emit(kind, len))
            }
            lexeme => {
                if let Some(len) = find_prefix(rest, &self.modifiers) {
                    return Ok(self.emit(TokenKind::Modifier, len));
                }
                if let Some(len) = find_prefix(rest, &self.operators) {
                    return Ok(self.emit(TokenKind::Operator, len));
                }
                let kind = match lexeme {
                    Some(Ok(Lexeme::DecNumber)) => TokenKind::DecNumber,
                    Some(Ok(Lexeme::HexNumber)) => TokenKind::HexNumber,
                    Some(Ok(Lexeme::OctNumber)) => TokenKind::OctNumber,
                    Some(Ok(Lexeme::BinNumber)) => TokenKind::BinNumber,
                    Some(Ok(Lexeme::QuotedNumber)) => TokenKind::QuotedNumber,
                    _ => Err(LexError::UnknownToken {
                        remaining: rest.into(),
                        offset: self.offset,
                    })?,
                };
                Ok(self.emit(kind, len))
            }
        }
    }
}

impl<'s> Iterator for Tokenizer<'s> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.offset += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return None;
        }

        let token = self.read_token(trimmed);
        self.failed = token.is_err();
        Some(token)
    }
}

/// One-token lookahead over a [`Tokenizer`], as used by the parsers.
pub struct TokenStream<'s> {
    tokens: Tokenizer<'s>,
    peeked: Option<Token>,
}

impl<'s> TokenStream<'s> {
    pub fn new(tokens: Tokenizer<'s>) -> Self {
        Self {
            tokens,
            peeked: None,
        }
    }

    pub fn peek(&mut self) -> Result<Option<&Token>, LexError> {
        if self.peeked.is_none() {
            self.peeked = self.tokens.next().transpose()?;
        }
        Ok(self.peeked.as_ref())
    }

    pub fn peek_kind(&mut self) -> Result<Option<TokenKind>, LexError> {
        Ok(self.peek()?.map(|token| token.kind))
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.tokens.next().transpose(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LexError, Token, TokenKind, Tokenizer};
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    const OPERATORS: &[&str] = &["+", "-", "*", "**", "/", "<=", "<", "and", "^"];
    const MODIFIERS: &[&str] = &["@", "#"];

    fn tokenize(source: &str) -> Vec<Result<Token, LexError>> {
        Tokenizer::new(source, OPERATORS, MODIFIERS).collect()
    }

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .into_iter()
            .map(|token| {
                let_assert!(Ok(token) = token);
                (token.kind, token.text.to_string())
            })
            .collect()
    }

    fn expected(tokens: &[(TokenKind, &str)]) -> Vec<(TokenKind, String)> {
        tokens
            .iter()
            .map(|(kind, text)| (*kind, text.to_string()))
            .collect()
    }

    #[test]
    fn infix_expression() {
        use TokenKind::*;
        assert!(
            kinds("max(1, x) + 2")
                == expected(&[
                    (Symbol, "max"),
                    (LeftBracket, "("),
                    (DecNumber, "1"),
                    (Separator, ","),
                    (Symbol, "x"),
                    (RightBracket, ")"),
                    (Operator, "+"),
                    (DecNumber, "2"),
                ])
        );
    }

    #[test]
    fn spans_cover_source() {
        let source = "  12 +\tabc";
        for token in tokenize(source) {
            let_assert!(Ok(token) = token);
            check!(&source[token.span.clone()] == token.text.as_ref());
        }
    }

    #[test]
    fn longest_operator_wins() {
        use TokenKind::*;
        check!(kinds("2**3") == expected(&[(DecNumber, "2"), (Operator, "**"), (DecNumber, "3")]));
        check!(kinds("1<=2") == expected(&[(DecNumber, "1"), (Operator, "<="), (DecNumber, "2")]));
    }

    #[test]
    fn keyword_operators_versus_identifiers() {
        use TokenKind::*;
        check!(kinds("a and b") == expected(&[(Symbol, "a"), (Operator, "and"), (Symbol, "b")]));
        check!(kinds("andy") == expected(&[(Symbol, "andy")]));
        check!(kinds("and(1)")[0] == (Operator, "and".to_string()));
    }

    #[test]
    fn modifiers_and_symbol_args() {
        use TokenKind::*;
        check!(kinds("@abs") == expected(&[(Modifier, "@"), (Symbol, "abs")]));
        check!(
            kinds("dup$3,5 pop$ a$,1")
                == expected(&[
                    (SymbolWithArgs, "dup$3,5"),
                    (SymbolWithArgs, "pop$"),
                    (SymbolWithArgs, "a$,1"),
                ])
        );
    }

    #[test]
    fn number_forms() {
        use TokenKind::*;
        check!(kinds("1_000.25") == expected(&[(DecNumber, "1_000.25")]));
        check!(kinds("0xFF") == expected(&[(HexNumber, "0xFF")]));
        check!(kinds("017") == expected(&[(OctNumber, "017")]));
        check!(kinds("08") == expected(&[(DecNumber, "08")]));
        // a non-octal digit anywhere makes the whole literal decimal
        check!(kinds("018") == expected(&[(DecNumber, "018")]));
        check!(kinds("017 8") == expected(&[(OctNumber, "017"), (DecNumber, "8")]));
        check!(kinds("0") == expected(&[(DecNumber, "0")]));
        check!(kinds("0b1010") == expected(&[(BinNumber, "0b1010")]));
        check!(kinds("36#Zz.1") == expected(&[(QuotedNumber, "36#Zz.1")]));
    }

    #[test]
    fn strings_are_unescaped() {
        let tokens = tokenize(r#""a\"b\n\x41é""#);
        let_assert!([Ok(token)] = tokens.as_slice());
        check!(token.kind == TokenKind::String);
        check!(token.text.as_ref() == "a\"b\nAé");

        let tokens = tokenize(r"'it\'s'");

        let_assert!([Ok(token)] = tokens.as_slice());
        check!(token.text.as_ref() == "it's");
    }

    #[test]
    fn string_errors() {
        let tokens = tokenize(r#"1 "abc"#);
        let_assert!([Ok(_), Err(err)] = tokens.as_slice());
        check!(*err == LexError::MalformedString { offset: 2 });

        let tokens = tokenize(r#""\q""#);

        let_assert!([Err(err)] = tokens.as_slice());
        check!(*err == LexError::InvalidEscape { escape: 'q', offset: 0 });
    }

    #[test]
    fn unknown_token_stops_iteration() {
        let tokens = tokenize("1 ? 2");
        let_assert!([Ok(_), Err(err)] = tokens.as_slice());
        check!(
            *err == LexError::UnknownToken {
                remaining: "? 2".into(),
                offset: 2
            }
        );
        check!(err.offset() == Some(2));
        check!(err.span() == Some(2..3));
    }

    #[test]
    fn unknown_token_span_covers_whole_character() {
        let tokens = tokenize("1 + é");
        let_assert!([Ok(_), Ok(_), Err(err)] = tokens.as_slice());
        check!(err.offset() == Some(4));
        check!(err.span() == Some(4..6));
    }

    #[test]
    fn whitespace_only() {
        assert!(tokenize(" \t\n ").is_empty());
    }

    #[test]
    fn identifiers_never_split() {
        arbtest(|u| {
            let len = u.int_in_range(1..=12)?;
            let mut ident = String::new();
            for i in 0..len {
                let c = if i == 0 {
                    *u.choose(&['_', 'a', 'q', 'Z', 'x'])?
                } else {
                    *u.choose(&['_', 'b', 'n', 'Y', '0', '9'])?
                };
                ident.push(c);
            }

            let tokens = kinds(&ident);
            assert!(tokens == vec![(TokenKind::Symbol, ident.clone())]);
            Ok(())
        });
    }
}
