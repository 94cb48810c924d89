//! Error taxonomy for the trace rule engine.
//!
//! Lexical, syntactic, runtime, and capacity errors are kept as distinct
//! types rather than collapsed into one string channel, so a caller can
//! match on what actually went wrong and where.

use thiserror::Error;

/// A lexical error, always tied to a source position.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string starting at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("unexpected character {ch:?} at line {line}, column {column}")]
    UnexpectedChar { ch: char, line: usize, column: usize },

    #[error("invalid number literal {text:?} at line {line}, column {column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnterminatedString { line, .. }
            | LexError::UnexpectedChar { line, .. }
            | LexError::InvalidNumber { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            LexError::UnterminatedString { column, .. }
            | LexError::UnexpectedChar { column, .. }
            | LexError::InvalidNumber { column, .. } => *column,
        }
    }
}

/// A syntactic error produced by the parser. Wraps lexical errors so the
/// parser is the single failure channel a `Load` caller needs to inspect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected token {found:?} at line {line}, column {column}: expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        line: usize,
        column: usize,
    },

    #[error("unexpected end of input at line {line}, column {column}: expected {expected}")]
    UnexpectedEof {
        expected: String,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    /// Line of the offending token, when known.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.line(),
            ParseError::UnexpectedToken { line, .. } => *line,
            ParseError::UnexpectedEof { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.column(),
            ParseError::UnexpectedToken { column, .. } => *column,
            ParseError::UnexpectedEof { column, .. } => *column,
        }
    }
}

/// A runtime error raised while walking a compiled AST against a span or
/// trace. Never propagated as a failure of `Evaluate`/`EvaluateTrace` —
/// the registry logs it and treats the rule as "no match" for that call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown field `{0}` on span")]
    UnknownField(String),

    #[error("undefined function `{0}`")]
    UndefinedFunction(String),

    #[error("wrong argument count for `{function}`: expected {expected}, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("cannot index into a non-map value")]
    NotIndexable,

    #[error("invalid regular expression in `matches`: {0}")]
    InvalidRegex(String),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation timed out")]
    TimedOut,
}

/// Raised only by `Load`, when adding a brand-new rule id would exceed
/// the registry's configured capacity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rule registry capacity ({cap}) exceeded, cannot add new rule `{rule_id}`")]
pub struct RegistryError {
    pub rule_id: String,
    pub cap: usize,
}

/// Everything `Load` can fail with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Capacity(#[from] RegistryError),
}
