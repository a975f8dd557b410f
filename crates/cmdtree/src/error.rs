use thiserror::Error;

use crate::parser::ArgumentError;

/// Value returned by a preprocessor that rejects its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct PreprocessError {
    pub reason: String,
}

impl PreprocessError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why `parse` could not produce a bound command.
///
/// `chain` fields hold the space-joined tokens accepted before the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no such command: '{input}'")]
    NoSuchCommand { chain: String, input: String },

    #[error("invalid syntax, expected: {syntax}")]
    InvalidSyntax { chain: String, syntax: String },

    #[error("invalid value for <{argument}>: {cause}")]
    ArgumentParse {
        argument: String,
        chain: String,
        consumed: usize,
        cause: ArgumentError,
    },

    #[error("input for <{argument}> was rejected: {cause}")]
    Preprocessor {
        argument: String,
        chain: String,
        cause: PreprocessError,
    },

    #[error("unknown flag '{token}'")]
    UnknownFlag { token: String },

    #[error("flag bundle '{token}' contains '{flag}', which takes a value")]
    AmbiguousFlag { token: String, flag: String },

    #[error("flag '--{flag}' was given more than once")]
    DuplicateFlag { flag: String },

    #[error("flag '--{flag}' requires a value")]
    MissingFlagValue { flag: String },

    #[error("expected a flag, found '{token}'")]
    NoFlagStarted { token: String },

    #[error("invalid value for flag '--{flag}': {cause}")]
    FlagValue { flag: String, cause: ArgumentError },
}

/// Two sibling nodes would both accept the same input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{new}' is ambiguous with existing '{existing}' under '{parent}'")]
pub struct AmbiguousNodeError {
    pub parent: String,
    pub existing: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    AmbiguousNode(#[from] AmbiguousNodeError),

    #[error("a command needs at least one component")]
    EmptyPath,

    #[error("the first component '{name}' must be a literal")]
    RootNotLiteral { name: String },

    #[error("required argument '{name}' follows an optional argument")]
    RequiredAfterOptional { name: String },

    #[error("literal '{name}' cannot be optional")]
    OptionalLiteral { name: String },

    #[error("command '{syntax}' is already registered")]
    DuplicateCommand { syntax: String },

    #[error("flag '{flag}' conflicts with a flag already declared at '{syntax}'")]
    ConflictingFlag { flag: String, syntax: String },

    #[error("<{name}> accepts no integer: range {min}..={max} is empty")]
    EmptyRange { name: String, min: i64, max: i64 },

    #[error("default '{input}' for <{name}> does not parse: {cause}")]
    InvalidDefault {
        name: String,
        input: String,
        cause: ArgumentError,
    },
}

/// Failure to run a bound command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("command '{command}' has no handler")]
    NoHandler { command: String },

    #[error("command '{command}' failed: {reason}")]
    Failed { command: String, reason: String },
}
