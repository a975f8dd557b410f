use std::fmt;
use std::sync::Arc;

use cmdtree_meta::{CommandMeta, DESCRIPTION, Location};
use indexmap::IndexMap;
use serde::Serialize;

use crate::context::{CommandContext, FlagValue};
use crate::error::{ExecutionError, PreprocessError};
use crate::flags::Flag;
use crate::node::Component;
use crate::parser::{ArgumentParser, Value};

/// Body of a command, run by [`BoundCommand::execute`].
pub type CommandHandler<S> = Arc<dyn Fn(&S, &Arguments) -> Result<(), String> + Send + Sync>;

/// A registration request: a full path from a root literal, plus flags,
/// metadata and an optional handler.
pub struct CommandDefinition<S> {
    pub(crate) components: Vec<Component<S>>,
    pub(crate) flags: Vec<Flag>,
    pub(crate) meta: CommandMeta,
    pub(crate) handler: Option<CommandHandler<S>>,
}

impl<S> CommandDefinition<S> {
    /// Start a path at the root literal `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::root(Component::literal(name))
    }

    /// Start a path at `component`, which must be a literal to register.
    pub fn root(component: Component<S>) -> Self {
        Self {
            components: vec![component],
            flags: Vec::new(),
            meta: CommandMeta::empty(),
            handler: None,
        }
    }

    pub fn literal(self, name: impl Into<String>) -> Self {
        self.component(Component::literal(name))
    }

    pub fn argument(self, name: impl Into<String>, parser: ArgumentParser) -> Self {
        self.component(Component::argument(name, parser))
    }

    pub fn component(mut self, component: Component<S>) -> Self {
        self.components.push(component);
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn meta(mut self, meta: CommandMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&S, &Arguments) -> Result<(), String> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn components(&self) -> &[Component<S>] {
        &self.components
    }
}

/// The shape of one registered component, kept on the command it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComponent {
    pub name: String,
    pub parser: ArgumentParser,
    pub required: bool,
    pub default: Option<String>,
}

/// A registered command. Shared by every node it is attached to.
pub struct Command<S> {
    components: Vec<CommandComponent>,
    flags: Vec<Flag>,
    meta: CommandMeta,
    handler: Option<CommandHandler<S>>,
}

impl<S> Command<S> {
    pub(crate) fn from_definition(definition: &CommandDefinition<S>) -> Self {
        let components = definition
            .components
            .iter()
            .map(|c| CommandComponent {
                name: c.name().to_string(),
                parser: c.parser().clone(),
                required: c.is_required(),
                default: c.default_input().map(str::to_string),
            })
            .collect();
        Self {
            components,
            flags: definition.flags.clone(),
            meta: definition.meta.clone(),
            handler: definition.handler.clone(),
        }
    }

    /// Name of the root literal.
    pub fn name(&self) -> &str {
        self.components
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or_default()
    }

    pub fn components(&self) -> &[CommandComponent] {
        &self.components
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn meta(&self) -> &CommandMeta {
        &self.meta
    }

    pub fn description(&self) -> Option<String> {
        self.meta.get(&DESCRIPTION)
    }

    pub fn is_hidden_from(&self, location: Location) -> bool {
        self.meta.is_hidden_from(location)
    }

    /// `root literal <required> [optional] [--flag <value>] [--presence]`
    pub fn syntax(&self) -> String {
        let mut parts: Vec<String> = self
            .components
            .iter()
            .map(|c| {
                if c.parser.is_literal() {
                    c.name.clone()
                } else if c.required {
                    format!("<{}>", c.name)
                } else {
                    format!("[{}]", c.name)
                }
            })
            .collect();
        parts.extend(self.flags.iter().map(Flag::syntax));
        parts.join(" ")
    }
}

impl<S> fmt::Debug for Command<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("syntax", &self.syntax())
            .field("meta", &self.meta)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Values bound by a successful parse, keyed by argument and flag name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Arguments {
    values: IndexMap<String, Value>,
    flags: IndexMap<String, FlagValue>,
}

impl Arguments {
    pub(crate) fn from_context<S>(ctx: CommandContext<'_, S>) -> Self {
        let (values, flags) = ctx.into_parts();
        Self { values, flags }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn flag(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(name)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn flags(&self) -> &IndexMap<String, FlagValue> {
        &self.flags
    }
}

/// A command together with the arguments parsed for it.
pub struct BoundCommand<S> {
    command: Arc<Command<S>>,
    arguments: Arguments,
}

impl<S> BoundCommand<S> {
    pub(crate) fn new(command: Arc<Command<S>>, arguments: Arguments) -> Self {
        Self { command, arguments }
    }

    pub fn command(&self) -> &Arc<Command<S>> {
        &self.command
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn into_arguments(self) -> Arguments {
        self.arguments
    }

    pub fn execute(&self, sender: &S) -> Result<(), ExecutionError> {
        let Some(handler) = &self.command.handler else {
            return Err(ExecutionError::NoHandler {
                command: self.command.syntax(),
            });
        };
        tracing::debug!("executing '{}'", self.command.name());
        handler(sender, &self.arguments).map_err(|reason| ExecutionError::Failed {
            command: self.command.syntax(),
            reason,
        })
    }
}

impl<S> fmt::Debug for BoundCommand<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCommand")
            .field("command", &self.command.syntax())
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// Convenience preprocessor rejecting a fixed set of first tokens.
pub fn reject_tokens<S, I, T>(
    rejected: I,
) -> impl Fn(&CommandContext<'_, S>, &[&str]) -> Result<(), PreprocessError> + Send + Sync + 'static
where
    S: 'static,
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let rejected: Vec<String> = rejected.into_iter().map(Into::into).collect();
    move |_ctx: &CommandContext<'_, S>, tokens: &[&str]| match tokens.first() {
        Some(token) if rejected.iter().any(|r| r.as_str() == *token) => {
            Err(PreprocessError::new(format!("'{token}' is not allowed here")))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_lists_components_and_flags() {
        let definition: CommandDefinition<()> = CommandDefinition::new("give")
            .argument("item", ArgumentParser::string())
            .component(Component::argument("amount", ArgumentParser::integer()).with_default("1"))
            .flag(Flag::presence("silent").with_alias("s"))
            .flag(Flag::valued("reason", ArgumentParser::quoted_string()));
        let command = Command::from_definition(&definition);

        assert_eq!(
            command.syntax(),
            "give <item> [amount] [--silent] [--reason <quoted-string>]"
        );
        assert_eq!(command.name(), "give");
    }

    #[test]
    fn execute_without_handler_fails() {
        let command: Arc<Command<()>> =
            Arc::new(Command::from_definition(&CommandDefinition::new("noop")));
        let bound = BoundCommand::new(command, Arguments::default());
        assert_eq!(
            bound.execute(&()),
            Err(ExecutionError::NoHandler {
                command: "noop".into()
            })
        );
    }

    #[test]
    fn reject_tokens_checks_first_token() {
        let check = reject_tokens::<(), _, _>(["1024"]);
        let sender = ();
        let ctx = CommandContext::new(&sender, "");
        assert!(check(&ctx, &["1024", "foo"]).is_err());
        assert!(check(&ctx, &["512"]).is_ok());
        assert!(check(&ctx, &[]).is_ok());
    }
}
