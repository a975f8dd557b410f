//! Argument parsers.
//!
//! Every node of the tree wraps one [`ArgumentParser`]. The set of parsers is
//! closed: each variant knows how many tokens it consumes ([`Arity`]), how to
//! turn them into a [`Value`], and which candidates to offer for a token that
//! is still being typed.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A parsed argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    /// Canonical (declared) name of the matched enum constant.
    Enum(String),
    Strings(Vec<String>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::Strings(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Enum(s) => f.write_str(s),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Strings(v) => f.write_str(&v.join(" ")),
            Self::Tuple(v) => {
                for (idx, item) in v.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Why a parser rejected its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("no input was provided")]
    NoInput,
    #[error("'{input}' does not match {}", .expected.join("|"))]
    LiteralMismatch { input: String, expected: Vec<String> },
    #[error("'{input}' is not a valid integer")]
    NumberFormat { input: String },
    #[error("'{input}' is not in the range [{min}, {max}]")]
    OutOfRange { input: String, min: i64, max: i64 },
    #[error("'{input}' is not a valid boolean")]
    BooleanFormat { input: String },
    #[error("'{input}' is not one of: {}", .accepted.join(", "))]
    EnumMismatch { input: String, accepted: Vec<String> },
    #[error("unterminated quote in '{input}'")]
    UnterminatedQuote { input: String },
    #[error("invalid {component}: {cause}")]
    Compound {
        component: String,
        cause: Box<ArgumentError>,
    },
}

/// A failed parse, with how many tokens were accepted before the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub cause: ArgumentError,
    pub consumed: usize,
}

impl Rejection {
    fn at_start(cause: ArgumentError) -> Self {
        Self { cause, consumed: 0 }
    }
}

/// How many tokens a parser takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Takes the rest of the input; a yielding parser stops at a flag boundary.
    Variadic { yielding: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMode {
    /// Exactly one token.
    #[default]
    Single,
    /// One token, or a `"..."`/`'...'` run of tokens joined by spaces.
    Quoted,
    /// Every remaining token, space-joined.
    Greedy,
    /// Like `Greedy`, but stops at the first flag boundary.
    GreedyFlagYielding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentParser {
    Literal {
        name: String,
        aliases: Vec<String>,
    },
    String(StringMode),
    StringArray {
        flag_yielding: bool,
    },
    Integer {
        min: i64,
        max: i64,
    },
    Boolean {
        liberal: bool,
    },
    Enum {
        constants: Vec<String>,
    },
    Compound {
        names: Vec<String>,
        parsers: Vec<ArgumentParser>,
    },
}

const STRICT_BOOLEANS: [&str; 2] = ["true", "false"];
const LIBERAL_BOOLEANS: [&str; 6] = ["true", "false", "yes", "no", "on", "off"];

fn boolean_words(liberal: bool) -> &'static [&'static str] {
    if liberal {
        &LIBERAL_BOOLEANS
    } else {
        &STRICT_BOOLEANS
    }
}

impl ArgumentParser {
    pub fn literal(name: impl Into<String>) -> Self {
        Self::Literal {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::String(StringMode::Single)
    }

    pub fn quoted_string() -> Self {
        Self::String(StringMode::Quoted)
    }

    pub fn greedy_string() -> Self {
        Self::String(StringMode::Greedy)
    }

    pub fn flag_yielding_string() -> Self {
        Self::String(StringMode::GreedyFlagYielding)
    }

    pub fn string_array(flag_yielding: bool) -> Self {
        Self::StringArray { flag_yielding }
    }

    pub fn integer() -> Self {
        Self::Integer {
            min: i64::MIN,
            max: i64::MAX,
        }
    }

    pub fn integer_range(min: i64, max: i64) -> Self {
        Self::Integer { min, max }
    }

    pub fn boolean(liberal: bool) -> Self {
        Self::Boolean { liberal }
    }

    pub fn enumeration<I, T>(constants: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Enum {
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }

    /// A fixed sequence of named single-token parsers (pairs, triplets, ...).
    pub fn compound<I, N>(components: I) -> Self
    where
        I: IntoIterator<Item = (N, ArgumentParser)>,
        N: Into<String>,
    {
        let (names, parsers) = components
            .into_iter()
            .map(|(name, parser)| (name.into(), parser))
            .unzip();
        Self::Compound { names, parsers }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }

    /// Literal name followed by its aliases; empty for other parsers.
    pub fn literal_names(&self) -> Vec<&str> {
        match self {
            Self::Literal { name, aliases } => std::iter::once(name.as_str())
                .chain(aliases.iter().map(String::as_str))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn matches_literal(&self, token: &str) -> bool {
        match self {
            Self::Literal { name, aliases } => name == token || aliases.iter().any(|a| a == token),
            _ => false,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::String(StringMode::Greedy) => Arity::Variadic { yielding: false },
            Self::String(StringMode::GreedyFlagYielding) => Arity::Variadic { yielding: true },
            Self::StringArray { flag_yielding } => Arity::Variadic {
                yielding: *flag_yielding,
            },
            Self::Compound { parsers, .. } => Arity::Fixed(parsers.len()),
            _ => Arity::Fixed(1),
        }
    }

    /// Short human name of the parser kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Literal { .. } => "literal",
            Self::String(StringMode::Single) => "string",
            Self::String(StringMode::Quoted) => "quoted-string",
            Self::String(StringMode::Greedy) => "greedy-string",
            Self::String(StringMode::GreedyFlagYielding) => "flag-yielding-string",
            Self::StringArray {
                flag_yielding: false,
            } => "string-array",
            Self::StringArray {
                flag_yielding: true,
            } => "flag-yielding-string-array",
            Self::Integer { .. } => "integer",
            Self::Boolean { .. } => "boolean",
            Self::Enum { .. } => "enum",
            Self::Compound { .. } => "compound",
        }
    }

    /// Component names and parsers of a compound parser.
    pub fn components(&self) -> Option<(&[String], &[ArgumentParser])> {
        match self {
            Self::Compound { names, parsers } => Some((names.as_slice(), parsers.as_slice())),
            _ => None,
        }
    }

    /// Parse a value from the front of `tokens`.
    ///
    /// `yields` tells flag-yielding parsers where the flag section begins.
    /// On success returns the value and the number of tokens consumed.
    pub fn parse(
        &self,
        tokens: &[&str],
        yields: &dyn Fn(&str) -> bool,
    ) -> Result<(Value, usize), Rejection> {
        let Some(first) = tokens.first().copied() else {
            return Err(Rejection::at_start(ArgumentError::NoInput));
        };

        match self {
            Self::Literal { name, aliases } => {
                if self.matches_literal(first) {
                    Ok((Value::String(name.clone()), 1))
                } else {
                    let mut expected = vec![name.clone()];
                    expected.extend(aliases.iter().cloned());
                    Err(Rejection::at_start(ArgumentError::LiteralMismatch {
                        input: first.to_string(),
                        expected,
                    }))
                }
            }
            Self::String(StringMode::Single) => Ok((Value::String(first.to_string()), 1)),
            Self::String(StringMode::Quoted) => parse_quoted(tokens),
            Self::String(StringMode::Greedy) => {
                Ok((Value::String(tokens.join(" ")), tokens.len()))
            }
            Self::String(StringMode::GreedyFlagYielding) => {
                let end = yield_point(tokens, yields)?;
                Ok((Value::String(tokens[..end].join(" ")), end))
            }
            Self::StringArray { flag_yielding } => {
                let end = if *flag_yielding {
                    yield_point(tokens, yields)?
                } else {
                    tokens.len()
                };
                let values = tokens[..end].iter().map(|t| t.to_string()).collect();
                Ok((Value::Strings(values), end))
            }
            Self::Integer { min, max } => parse_integer(first, *min, *max)
                .map(|v| (Value::Integer(v), 1))
                .map_err(Rejection::at_start),
            Self::Boolean { liberal } => parse_boolean(first, *liberal)
                .map(|v| (Value::Boolean(v), 1))
                .map_err(Rejection::at_start),
            Self::Enum { constants } => constants
                .iter()
                .find(|c| c.eq_ignore_ascii_case(first))
                .map(|c| (Value::Enum(c.clone()), 1))
                .ok_or_else(|| {
                    Rejection::at_start(ArgumentError::EnumMismatch {
                        input: first.to_string(),
                        accepted: constants.iter().map(|c| c.to_ascii_lowercase()).collect(),
                    })
                }),
            Self::Compound { names, parsers } => {
                let mut offset = 0usize;
                let mut values = Vec::with_capacity(parsers.len());
                for (name, parser) in names.iter().zip(parsers) {
                    match parser.parse(&tokens[offset..], yields) {
                        Ok((value, used)) => {
                            values.push(value);
                            offset += used;
                        }
                        Err(rejection) => {
                            return Err(Rejection {
                                cause: ArgumentError::Compound {
                                    component: name.clone(),
                                    cause: Box::new(rejection.cause),
                                },
                                consumed: offset + rejection.consumed,
                            });
                        }
                    }
                }
                Ok((Value::Tuple(values), offset))
            }
        }
    }

    /// Built-in candidates for `typed`, before prefix filtering.
    pub fn suggestions(&self, typed: &str) -> Vec<String> {
        match self {
            Self::Literal { name, .. } => vec![name.clone()],
            Self::String(_) | Self::StringArray { .. } => Vec::new(),
            Self::Integer { min, max } => integer_suggestions(*min, *max, typed),
            Self::Boolean { liberal } => boolean_words(*liberal)
                .iter()
                .map(|w| w.to_string())
                .collect(),
            Self::Enum { constants } => constants.iter().map(|c| c.to_ascii_lowercase()).collect(),
            Self::Compound { parsers, .. } => parsers
                .first()
                .map(|p| p.suggestions(typed))
                .unwrap_or_default(),
        }
    }

    /// Candidates for the `index`-th token of this parser's input.
    pub fn component_suggestions(&self, index: usize, typed: &str) -> Vec<String> {
        match self {
            Self::Compound { parsers, .. } => parsers
                .get(index)
                .map(|p| p.suggestions(typed))
                .unwrap_or_default(),
            _ => self.suggestions(typed),
        }
    }

    pub(crate) fn domain(&self) -> Domain<'_> {
        match self {
            Self::Literal { .. } | Self::String(_) | Self::StringArray { .. } => Domain::Open,
            Self::Integer { min, max } => Domain::Integer {
                min: *min,
                max: *max,
            },
            Self::Boolean { liberal } => Domain::Boolean { liberal: *liberal },
            Self::Enum { constants } => Domain::Words(constants.as_slice()),
            Self::Compound { parsers, .. } => {
                parsers.first().map(|p| p.domain()).unwrap_or(Domain::Open)
            }
        }
    }
}

fn yield_point(tokens: &[&str], yields: &dyn Fn(&str) -> bool) -> Result<usize, Rejection> {
    let end = tokens
        .iter()
        .position(|t| yields(t))
        .unwrap_or(tokens.len());
    if end == 0 {
        return Err(Rejection::at_start(ArgumentError::NoInput));
    }
    Ok(end)
}

fn parse_quoted(tokens: &[&str]) -> Result<(Value, usize), Rejection> {
    let first = tokens[0];
    let Some(quote) = first.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return Ok((Value::String(first.to_string()), 1));
    };

    for (idx, token) in tokens.iter().enumerate() {
        let closes = if idx == 0 {
            token.len() >= 2 && token.ends_with(quote)
        } else {
            token.ends_with(quote)
        };
        if closes {
            let joined = tokens[..=idx].join(" ");
            let inner = &joined[1..joined.len() - 1];
            return Ok((Value::String(inner.to_string()), idx + 1));
        }
    }

    Err(Rejection {
        cause: ArgumentError::UnterminatedQuote {
            input: tokens.join(" "),
        },
        consumed: tokens.len(),
    })
}

pub(crate) fn parse_integer(input: &str, min: i64, max: i64) -> Result<i64, ArgumentError> {
    let digits = input.strip_prefix('-').unwrap_or(input);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ArgumentError::NumberFormat {
            input: input.to_string(),
        });
    }
    let value: i64 = input.parse().map_err(|_| ArgumentError::NumberFormat {
        input: input.to_string(),
    })?;
    if value < min || value > max {
        return Err(ArgumentError::OutOfRange {
            input: input.to_string(),
            min,
            max,
        });
    }
    Ok(value)
}

fn parse_boolean(input: &str, liberal: bool) -> Result<bool, ArgumentError> {
    let lowered = input.to_ascii_lowercase();
    match lowered.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        "yes" | "on" if liberal => Ok(true),
        "no" | "off" if liberal => Ok(false),
        _ => Err(ArgumentError::BooleanFormat {
            input: input.to_string(),
        }),
    }
}

/// `typed` itself when it is an in-range number, followed by every in-range
/// number one more digit long. Never looks further than one digit ahead.
fn integer_suggestions(min: i64, max: i64, typed: &str) -> Vec<String> {
    let negative = typed.starts_with('-');
    let digits = if negative { &typed[1..] } else { typed };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Vec::new();
    }
    // Parsed with its sign so that i64::MIN is reachable.
    let value: i64 = if digits.is_empty() {
        0
    } else {
        match typed.parse() {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        }
    };
    let in_range = |v: i64| v >= min && v <= max;

    let mut out: Vec<String> = Vec::new();
    if !digits.is_empty() && in_range(value) {
        out.push(value.to_string());
    }
    for digit in 0..10 {
        let next = value.checked_mul(10).and_then(|v| {
            if negative {
                v.checked_sub(digit)
            } else {
                v.checked_add(digit)
            }
        });
        let Some(next) = next else {
            break;
        };
        // "-" followed by 0 would be a negative zero.
        if negative && next == 0 {
            continue;
        }
        if in_range(next) {
            let candidate = next.to_string();
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

/// The set of inputs an argument parser can accept, for sibling ambiguity checks.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Domain<'a> {
    Open,
    Integer { min: i64, max: i64 },
    Boolean { liberal: bool },
    Words(&'a [String]),
}

impl Domain<'_> {
    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Domain::Open)
    }

    pub(crate) fn accepts(&self, word: &str) -> bool {
        match self {
            Domain::Open => true,
            Domain::Integer { min, max } => parse_integer(word, *min, *max).is_ok(),
            Domain::Boolean { liberal } => parse_boolean(word, *liberal).is_ok(),
            Domain::Words(words) => words.iter().any(|w| w.eq_ignore_ascii_case(word)),
        }
    }

    pub(crate) fn overlaps(&self, other: &Domain<'_>) -> bool {
        match (self, other) {
            (Domain::Open, _) | (_, Domain::Open) => true,
            (Domain::Integer { min: a, max: b }, Domain::Integer { min: c, max: d }) => {
                a <= d && c <= b
            }
            (Domain::Integer { .. }, Domain::Boolean { .. })
            | (Domain::Boolean { .. }, Domain::Integer { .. }) => false,
            (Domain::Boolean { .. }, Domain::Boolean { .. }) => true,
            (Domain::Words(words), other) | (other, Domain::Words(words)) => {
                words.iter().any(|w| other.accepts(w))
            }
        }
    }
}
