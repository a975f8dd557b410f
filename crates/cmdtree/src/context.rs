//! Call-scoped state shared by `parse` and `suggest`.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::parser::Value;

/// How a flag was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Present,
    Value(Value),
}

impl FlagValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Present => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl Serialize for FlagValue {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match self {
            Self::Present => serializer.serialize_bool(true),
            Self::Value(value) => value.serialize(serializer),
        }
    }
}

/// Values gathered while walking the tree for one call.
///
/// Handed to preprocessors and suggestion providers so they can look at what
/// was already parsed. Never outlives the call that created it.
pub struct CommandContext<'a, S> {
    sender: &'a S,
    input: &'a str,
    values: IndexMap<String, Value>,
    flags: IndexMap<String, FlagValue>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    values: usize,
    flags: usize,
}

impl<'a, S> CommandContext<'a, S> {
    pub(crate) fn new(sender: &'a S, input: &'a str) -> Self {
        Self {
            sender,
            input,
            values: IndexMap::new(),
            flags: IndexMap::new(),
        }
    }

    pub fn sender(&self) -> &'a S {
        self.sender
    }

    /// The raw input of this call.
    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub(crate) fn store(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub(crate) fn store_flag(&mut self, name: &str, value: FlagValue) {
        self.flags.insert(name.to_string(), value);
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            values: self.values.len(),
            flags: self.flags.len(),
        }
    }

    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.values.truncate(checkpoint.values);
        self.flags.truncate(checkpoint.flags);
    }

    pub(crate) fn into_parts(self) -> (IndexMap<String, Value>, IndexMap<String, FlagValue>) {
        (self.values, self.flags)
    }
}

/// Split complete input into tokens.
pub(crate) fn tokenize(input: &str) -> Vec<&str> {
    input.split_whitespace().collect()
}

/// Split partial input into tokens; the last token is the one being typed and
/// is empty when the input is empty or ends in whitespace.
pub(crate) fn tokenize_partial(input: &str) -> Vec<&str> {
    let mut tokens = tokenize(input);
    if input.is_empty() || input.ends_with(char::is_whitespace) {
        tokens.push("");
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_input_keeps_a_trailing_empty_token() {
        assert_eq!(tokenize_partial("test "), vec!["test", ""]);
        assert_eq!(tokenize_partial("test  one"), vec!["test", "one"]);
        assert_eq!(tokenize_partial(""), vec![""]);
        assert_eq!(tokenize("  a   b "), vec!["a", "b"]);
    }

    #[test]
    fn rollback_discards_later_values() {
        let sender = ();
        let mut ctx = CommandContext::new(&sender, "x");
        ctx.store("a", Value::Integer(1));
        let checkpoint = ctx.checkpoint();
        ctx.store("b", Value::Integer(2));
        ctx.store_flag("f", FlagValue::Present);
        ctx.rollback(checkpoint);

        assert_eq!(ctx.get("a"), Some(&Value::Integer(1)));
        assert!(ctx.get("b").is_none());
        assert!(!ctx.has_flag("f"));
    }
}
