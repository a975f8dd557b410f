//! Generic command-tree engine.
//!
//! Commands are registered as paths of literals and typed arguments, with
//! optional flags. A built [`CommandTree`] can then:
//! - `parse` complete input into a [`BoundCommand`] (or one [`ParseFailure`])
//! - `suggest` completions for partial input
//!
//! Metadata attached to commands lives in the `cmdtree-meta` crate and is
//! re-exported as [`meta`].

pub mod command;
pub mod context;
pub mod error;
pub mod flags;
pub mod node;
pub mod parser;
pub mod suggestion;
pub mod tree;

pub use cmdtree_meta as meta;

pub use command::{
    Arguments, BoundCommand, Command, CommandComponent, CommandDefinition, CommandHandler,
    reject_tokens,
};
pub use context::{CommandContext, FlagValue};
pub use error::{
    AmbiguousNodeError, ExecutionError, ParseFailure, PreprocessError, RegistrationError,
};
pub use flags::{Flag, FlagMode};
pub use node::{Component, Preprocessor, SuggestionProvider};
pub use parser::{ArgumentError, ArgumentParser, Arity, Rejection, StringMode, Value};
pub use suggestion::{Filter, FilteringProcessor, PassthroughProcessor, SuggestionProcessor};
pub use tree::{CommandTree, NodeOutline, TreeSettings};
