//! Positional-notation decoding shared by the numeric back-ends.
//!
//! A number token is split into its radix and the digit values on either side of the
//! radix point. Back-ends fold those digits into whatever representation they use.

use arbitrary::Arbitrary;

use crate::lexer::{Token, TokenKind};

pub const MIN_RADIX: u32 = 2;
pub const MAX_RADIX: u32 = 64;

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ValueError {
    #[error("{0} tokens are not supported by this value type")]
    Unsupported(TokenKind),
    #[error("radix {0} is outside of 2..=64")]
    InvalidRadix(u32),
    #[error("malformed number literal '{0}'")]
    Malformed(Box<str>),
    #[error("digit '{digit}' is not valid in radix {radix}")]
    InvalidDigit { digit: char, radix: u32 },
    #[error("fractional part not allowed here")]
    FractionNotAllowed,
    #[error("number literal too big")]
    TooBig,
}

/// Value of `c` as a digit in `radix`.
///
/// Up to radix 36 letters are case-insensitive. Above that `A-Z` are 10..=35, `a-z` are
/// 36..=61, `'` is 62 and `"` is 63.
pub fn digit_value(c: char, radix: u32) -> Result<u32, ValueError> {
    let value = if radix <= 36 {
        c.to_digit(36)
    } else {
        match c {
            '0'..='9' => Some(c as u32 - '0' as u32),
            'A'..='Z' => Some(c as u32 - 'A' as u32 + 10),
            'a'..='z' => Some(c as u32 - 'a' as u32 + 36),
            '\'' => Some(62),
            '"' => Some(63),
            _ => None,
        }
    };

    value
        .filter(|v| *v < radix)
        .ok_or(ValueError::InvalidDigit { digit: c, radix })
}

/// Inverse of [`digit_value`], using upper case letters below 36.
pub fn digit_char(value: u32) -> Option<char> {
    match value {
        0..=9 => char::from_digit(value, 10),
        10..=35 => char::from_u32('A' as u32 + value - 10),
        36..=61 => char::from_u32('a' as u32 + value - 36),
        62 => Some('\''),
        63 => Some('"'),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Positional {
    pub radix: u32,
    pub integer: Vec<u32>,
    pub fraction: Option<Vec<u32>>,
}

impl Positional {
    pub fn from_token(token: &Token) -> Result<Self, ValueError> {
        let text = token.text.as_ref();
        let (radix, digits) = match token.kind {
            TokenKind::DecNumber => (10, text),
            TokenKind::HexNumber => (16, text.strip_prefix("0x").unwrap_or(text)),
            TokenKind::OctNumber => (8, text.strip_prefix('0').unwrap_or(text)),
            TokenKind::BinNumber => (2, text.strip_prefix("0b").unwrap_or(text)),
            TokenKind::QuotedNumber => {
                let (radix, digits) = text
                    .split_once('#')
                    .ok_or_else(|| ValueError::Malformed(text.into()))?;
                let radix = radix.parse().map_err(|_| ValueError::TooBig)?;
                (radix, digits)
            }
            kind => return Err(ValueError::Unsupported(kind)),
        };

        Self::parse(radix, digits)
    }

    /// Parses `digits` (with optional `_` separators and radix point) in `radix`.
    pub fn parse(radix: u32, digits: &str) -> Result<Self, ValueError> {
        if !(MIN_RADIX..=MAX_RADIX).contains(&radix) {
            return Err(ValueError::InvalidRadix(radix));
        }

        let decode = |part: &str| {
            part.chars()
                .filter(|c| *c != '_')
                .map(|c| digit_value(c, radix))
                .collect::<Result<Vec<_>, _>>()
        };

        let (integer, fraction) = match digits.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (digits, None),
        };
        let integer = decode(integer)?;
        let fraction = fraction.map(decode).transpose()?;
        if integer.is_empty() || fraction.as_ref().is_some_and(Vec::is_empty) {
            return Err(ValueError::Malformed(digits.into()));
        }

        Ok(Self {
            radix,
            integer,
            fraction,
        })
    }

    /// Integer value, rejecting fractions and overflow.
    pub fn to_u64(&self) -> Result<u64, ValueError> {
        if self.fraction.is_some() {
            return Err(ValueError::FractionNotAllowed);
        }
        self.integer.iter().try_fold(0u64, |acc, digit| {
            acc.checked_mul(u64::from(self.radix))
                .and_then(|acc| acc.checked_add(u64::from(*digit)))
                .ok_or(ValueError::TooBig)
        })
    }

    pub fn to_f64(&self) -> f64 {
        let radix = f64::from(self.radix);
        let integer = self
            .integer
            .iter()
            .fold(0.0, |acc, digit| acc * radix + f64::from(*digit));
        let fraction = self.fraction.as_deref().map_or(0.0, |digits| {
            digits
                .iter()
                .rev()
                .fold(0.0, |acc, digit| (acc + f64::from(*digit)) / radix)
        });
        integer + fraction
    }

    /// Renders as a quoted literal, e.g. `16#1F.8`.
    pub fn to_literal(&self) -> String {
        let render = |digits: &[u32]| digits.iter().filter_map(|d| digit_char(*d)).collect::<String>();
        let mut literal = format!("{}#{}", self.radix, render(&self.integer));
        if let Some(fraction) = &self.fraction {
            literal.push('.');
            literal.push_str(&render(fraction));
        }
        literal
    }
}

impl<'a> Arbitrary<'a> for Positional {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let radix = u.int_in_range(MIN_RADIX..=MAX_RADIX)?;
        let digits = |u: &mut arbitrary::Unstructured<'a>| -> arbitrary::Result<Vec<u32>> {
            let len = u.int_in_range(1..=8)?;
            (0..len).map(|_| u.int_in_range(0..=radix - 1)).collect()
        };
        let integer = digits(u)?;
        let fraction = if u.arbitrary()? {
            Some(digits(u)?)
        } else {
            None
        };
        Ok(Self {
            radix,
            integer,
            fraction,
        })
    }
}
