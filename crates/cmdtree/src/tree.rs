//! The command tree: registration, parsing and suggestions.

use std::fmt;
use std::sync::Arc;

use cmdtree_meta::Location;
use serde::{Deserialize, Serialize};

use crate::command::{Arguments, BoundCommand, Command, CommandDefinition};
use crate::context::{CommandContext, tokenize, tokenize_partial};
use crate::error::{AmbiguousNodeError, ParseFailure, RegistrationError};
use crate::flags::{FlagMode, FlagSet, components_accept};
use crate::node::{Component, Node};
use crate::parser::{ArgumentParser, Arity};
use crate::suggestion::{FilteringProcessor, Frontier, SuggestionProcessor, finish};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSettings {
    #[serde(default)]
    pub flag_mode: FlagMode,
}

/// Serialisable view of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutline {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hidden_from: Vec<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeOutline>,
}

/// A parse failure with the number of tokens accepted before it.
struct Failed {
    failure: ParseFailure,
    depth: usize,
}

impl Failed {
    fn new(failure: ParseFailure, depth: usize) -> Self {
        Self { failure, depth }
    }
}

enum Attempt {
    Matched(usize),
    Rejected(Failed),
}

/// A forest of commands, built once and then queried.
///
/// `parse` and `suggest` take `&self` and keep their working state in a
/// per-call [`CommandContext`], so a built tree can be shared across threads.
/// `insert` needs `&mut self`.
pub struct CommandTree<S> {
    roots: Vec<Node<S>>,
    settings: TreeSettings,
    processor: Box<dyn SuggestionProcessor>,
}

impl<S> Default for CommandTree<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for CommandTree<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTree")
            .field("roots", &self.roots.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl<S> CommandTree<S> {
    pub fn new() -> Self {
        Self::with_settings(TreeSettings::default())
    }

    pub fn with_settings(settings: TreeSettings) -> Self {
        Self {
            roots: Vec::new(),
            settings,
            processor: Box::new(FilteringProcessor::default()),
        }
    }

    pub fn with_processor(mut self, processor: impl SuggestionProcessor + 'static) -> Self {
        self.processor = Box::new(processor);
        self
    }

    pub fn set_processor(&mut self, processor: impl SuggestionProcessor + 'static) {
        self.processor = Box::new(processor);
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    /// Register a command path.
    ///
    /// Nodes shared with earlier commands are reused. The command is attached
    /// to the node of its last required component and every node after it.
    /// Nothing is changed when an error is returned.
    pub fn insert(
        &mut self,
        definition: CommandDefinition<S>,
    ) -> Result<Arc<Command<S>>, RegistrationError> {
        validate_definition(&definition)?;
        let attach_from = definition
            .components
            .iter()
            .rposition(Component::is_required)
            .unwrap_or(0);

        if let Err(err) = self.check_placement(&definition, attach_from) {
            tracing::debug!("rejected registration: {}", err);
            return Err(err);
        }

        let command = Arc::new(Command::from_definition(&definition));
        let mut siblings = &mut self.roots;
        let mut created = 0usize;
        for (depth, component) in definition.components.into_iter().enumerate() {
            let index = match siblings
                .iter()
                .position(|n| n.component.same_position(&component))
            {
                Some(index) => {
                    siblings[index].component.merge(&component);
                    index
                }
                None => {
                    created += 1;
                    Node::insert_child(siblings, Node::new(component))
                }
            };
            let node = &mut siblings[index];
            node.record_owner(command.meta());
            if depth >= attach_from {
                node.command = Some(Arc::clone(&command));
                node.flags = command.flags().to_vec();
            }
            siblings = &mut node.children;
        }

        tracing::debug!(
            "registered '{}' ({} new node(s))",
            command.syntax(),
            created
        );
        Ok(command)
    }

    fn check_placement(
        &self,
        definition: &CommandDefinition<S>,
        attach_from: usize,
    ) -> Result<(), RegistrationError> {
        let mut siblings: &[Node<S>] = &self.roots;
        let mut parent = String::from("<root>");
        for (depth, component) in definition.components.iter().enumerate() {
            let Some(existing) = siblings
                .iter()
                .find(|n| n.component.same_position(component))
            else {
                check_siblings(&parent, siblings, component, None)?;
                return Ok(());
            };

            if component.is_literal() {
                check_siblings(&parent, siblings, component, Some(existing))?;
            }
            if depth >= attach_from {
                if let Some(command) = &existing.command {
                    return Err(RegistrationError::DuplicateCommand {
                        syntax: command.syntax(),
                    });
                }
            }
            parent = existing.component.name().to_string();
            siblings = &existing.children;
        }
        Ok(())
    }

    /// Every registered command, in tree order.
    pub fn commands(&self) -> Vec<Arc<Command<S>>> {
        fn collect<S>(nodes: &[Node<S>], out: &mut Vec<Arc<Command<S>>>) {
            for node in nodes {
                if let Some(command) = &node.command {
                    if !out.iter().any(|c| Arc::ptr_eq(c, command)) {
                        out.push(Arc::clone(command));
                    }
                }
                collect(&node.children, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.roots, &mut out);
        out
    }

    pub fn outline(&self) -> Vec<NodeOutline> {
        fn describe<S>(node: &Node<S>) -> NodeOutline {
            let component = &node.component;
            let names = component.parser().literal_names();
            NodeOutline {
                name: component.name().to_string(),
                kind: component.parser().kind(),
                aliases: names.iter().skip(1).map(|a| a.to_string()).collect(),
                required: component.is_required(),
                command: node.command.as_ref().map(|c| c.syntax()),
                hidden_from: Location::ALL
                    .into_iter()
                    .filter(|l| node.is_hidden_from(*l))
                    .collect(),
                children: node.children.iter().map(describe).collect(),
            }
        }
        self.roots.iter().map(describe).collect()
    }

    /// Parse complete input into a command with bound arguments.
    pub fn parse(&self, sender: &S, input: &str) -> Result<BoundCommand<S>, ParseFailure> {
        let tokens = tokenize(input);
        let mut ctx = CommandContext::new(sender, input);

        match self.parse_tokens(&tokens, &mut ctx) {
            Ok(command) => {
                tracing::debug!("parsed '{}' as '{}'", input, command.syntax());
                Ok(BoundCommand::new(command, Arguments::from_context(ctx)))
            }
            Err(failed) => {
                tracing::debug!("failed to parse '{}': {}", input, failed.failure);
                Err(failed.failure)
            }
        }
    }

    fn parse_tokens(
        &self,
        tokens: &[&str],
        ctx: &mut CommandContext<'_, S>,
    ) -> Result<Arc<Command<S>>, Failed> {
        let Some(first) = tokens.first().copied() else {
            return Err(Failed::new(
                ParseFailure::NoSuchCommand {
                    chain: String::new(),
                    input: String::new(),
                },
                0,
            ));
        };
        let Some(root) = self
            .roots
            .iter()
            .find(|r| r.component.parser().matches_literal(first))
        else {
            return Err(Failed::new(
                ParseFailure::NoSuchCommand {
                    chain: String::new(),
                    input: first.to_string(),
                },
                0,
            ));
        };
        preprocess(root, tokens, 0, ctx)?;
        self.walk(root, tokens, 1, ctx)
    }

    fn walk(
        &self,
        node: &Node<S>,
        tokens: &[&str],
        pos: usize,
        ctx: &mut CommandContext<'_, S>,
    ) -> Result<Arc<Command<S>>, Failed> {
        let flags = FlagSet::new(&node.flags, self.settings.flag_mode);
        if pos < tokens.len() && flags.is_boundary(tokens[pos]) {
            tracing::trace!("'{}': flag section at {}", node.component.name(), pos);
            let end = flags
                .parse(tokens, pos, ctx, false)
                .map_err(|failure| Failed::new(failure, tokens.len()))?;
            return self.complete(node, tokens, end, ctx);
        }
        if pos == tokens.len() {
            return self.complete(node, tokens, pos, ctx);
        }

        let token = tokens[pos];
        if let Some(child) = node
            .children
            .iter()
            .find(|c| c.component.parser().matches_literal(token))
        {
            preprocess(child, tokens, pos, ctx)?;
            tracing::trace!("'{}': literal '{}'", node.component.name(), token);
            return self.walk(child, tokens, pos + 1, ctx);
        }

        let mut deepest: Option<Failed> = None;
        for child in node.children.iter().filter(|c| !c.component.is_literal()) {
            let checkpoint = ctx.checkpoint();
            match self.parse_argument(child, tokens, pos, ctx)? {
                Attempt::Matched(next) => {
                    tracing::trace!(
                        "'{}': <{}> took {} token(s)",
                        node.component.name(),
                        child.component.name(),
                        next - pos
                    );
                    return self.walk(child, tokens, next, ctx);
                }
                Attempt::Rejected(failed) => {
                    ctx.rollback(checkpoint);
                    if deepest.as_ref().map_or(true, |d| failed.depth > d.depth) {
                        deepest = Some(failed);
                    }
                }
            }
        }
        if let Some(failed) = deepest {
            return Err(failed);
        }

        let chain = tokens[..pos].join(" ");
        if !flags.is_empty() {
            flags
                .parse(tokens, pos, ctx, false)
                .map_err(|failure| Failed::new(failure, pos))?;
        }
        match &node.command {
            Some(command) if node.is_leaf() => Err(Failed::new(
                ParseFailure::InvalidSyntax {
                    chain,
                    syntax: command.syntax(),
                },
                pos,
            )),
            _ => Err(Failed::new(
                ParseFailure::NoSuchCommand {
                    chain,
                    input: token.to_string(),
                },
                pos,
            )),
        }
    }

    fn parse_argument(
        &self,
        child: &Node<S>,
        tokens: &[&str],
        pos: usize,
        ctx: &mut CommandContext<'_, S>,
    ) -> Result<Attempt, Failed> {
        let flags = FlagSet::new(&child.flags, self.settings.flag_mode);
        let mut start = pos;
        if self.settings.flag_mode == FlagMode::Liberal && !flags.is_empty() {
            match flags.parse(tokens, pos, ctx, true) {
                Ok(next) => start = next,
                Err(failure) => return Ok(Attempt::Rejected(Failed::new(failure, pos))),
            }
        }

        let component = &child.component;
        let rest = &tokens[start..];
        preprocess(child, tokens, start, ctx)?;
        match component.parser().parse(rest, &|t| flags.is_boundary(t)) {
            Ok((value, used)) => {
                ctx.store(component.name(), value);
                Ok(Attempt::Matched(start + used))
            }
            Err(rejection) => Ok(Attempt::Rejected(Failed::new(
                ParseFailure::ArgumentParse {
                    argument: component.name().to_string(),
                    chain: tokens[..start].join(" "),
                    consumed: rejection.consumed,
                    cause: rejection.cause,
                },
                start + rejection.consumed,
            ))),
        }
    }

    /// Input ended at `node`: bind its command and fill in defaults.
    fn complete(
        &self,
        node: &Node<S>,
        tokens: &[&str],
        pos: usize,
        ctx: &mut CommandContext<'_, S>,
    ) -> Result<Arc<Command<S>>, Failed> {
        let chain = tokens[..pos].join(" ");
        let Some(command) = &node.command else {
            if node.is_leaf() {
                return Err(Failed::new(
                    ParseFailure::NoSuchCommand {
                        chain,
                        input: String::new(),
                    },
                    pos,
                ));
            }
            let options: Vec<String> = node
                .children
                .iter()
                .map(|c| {
                    if c.component.is_literal() {
                        c.component.name().to_string()
                    } else {
                        format!("<{}>", c.component.name())
                    }
                })
                .collect();
            return Err(Failed::new(
                ParseFailure::InvalidSyntax {
                    syntax: format!("{chain} {}", options.join("|")),
                    chain,
                },
                pos,
            ));
        };

        for component in command.components() {
            let Some(default) = &component.default else {
                continue;
            };
            if ctx.get(&component.name).is_some() {
                continue;
            }
            let default_tokens = tokenize(default);
            let (value, _) = component
                .parser
                .parse(&default_tokens, &|_| false)
                .map_err(|rejection| {
                    Failed::new(
                        ParseFailure::ArgumentParse {
                            argument: component.name.clone(),
                            chain: chain.clone(),
                            consumed: 0,
                            cause: rejection.cause,
                        },
                        pos,
                    )
                })?;
            ctx.store(&component.name, value);
        }
        Ok(Arc::clone(command))
    }

    /// Completions for partial input. Never fails; unmatched input yields
    /// nothing.
    pub fn suggest(&self, sender: &S, input: &str) -> Vec<String> {
        let tokens = tokenize_partial(input);
        let mut ctx = CommandContext::new(sender, input);
        let mut frontiers = Vec::new();
        self.suggest_children(None, &self.roots, &tokens, 0, &mut ctx, &mut frontiers);

        let suggestions = finish(self.processor.as_ref(), frontiers);
        tracing::debug!("{} suggestion(s) for '{}'", suggestions.len(), input);
        suggestions
    }

    fn suggest_children(
        &self,
        node: Option<&Node<S>>,
        children: &[Node<S>],
        tokens: &[&str],
        pos: usize,
        ctx: &mut CommandContext<'_, S>,
        out: &mut Vec<Frontier>,
    ) {
        let remaining = &tokens[pos.min(tokens.len())..];
        let Some(&token) = remaining.first() else {
            return;
        };

        let flags = node.map(|n| FlagSet::new(&n.flags, self.settings.flag_mode));
        if let Some(flags) = flags.filter(|f| !f.is_empty()) {
            let in_flag_section = remaining.len() >= 2 && flags.is_boundary(token);
            if in_flag_section || children.is_empty() {
                flags.suggest(remaining, ctx, out);
                return;
            }
        }

        if let Some(child) = children
            .iter()
            .find(|c| c.component.parser().matches_literal(token))
        {
            if child.component.preprocess(ctx, remaining).is_err() {
                return;
            }
            self.suggest_children(Some(child), &child.children, tokens, pos + 1, ctx, out);
            return;
        }

        if remaining.len() == 1 {
            let literals = children
                .iter()
                .filter(|c| c.component.is_literal() && !c.is_hidden_from(Location::Suggestions))
                .map(|c| c.component.name().to_string())
                .collect();
            out.push(Frontier::new(token, literals));
        }

        for child in children.iter().filter(|c| !c.component.is_literal()) {
            let checkpoint = ctx.checkpoint();
            self.suggest_argument(child, tokens, pos, ctx, out);
            ctx.rollback(checkpoint);
        }

        if let Some(flags) = flags.filter(|f| !f.is_empty()) {
            if remaining.len() == 1 {
                out.push(Frontier::new(token, flags.candidates(token, ctx)));
            }
        }
    }

    fn suggest_argument(
        &self,
        child: &Node<S>,
        tokens: &[&str],
        pos: usize,
        ctx: &mut CommandContext<'_, S>,
        out: &mut Vec<Frontier>,
    ) {
        let liberal = self.settings.flag_mode == FlagMode::Liberal;
        let flags = FlagSet::new(&child.flags, self.settings.flag_mode);
        let component = &child.component;
        let parser = component.parser();
        let hidden = child.is_hidden_from(Location::Suggestions);

        let mut start = pos;
        if liberal && !flags.is_empty() && flags.is_boundary(tokens[pos]) {
            let complete = &tokens[..tokens.len() - 1];
            match flags.parse(complete, pos, ctx, true) {
                Ok(next) if next < complete.len() => start = next,
                _ => {
                    flags.suggest(&tokens[pos..], ctx, out);
                    return;
                }
            }
        }

        let remaining = &tokens[start..];
        let Some((&current, _)) = remaining.split_last() else {
            return;
        };
        match parser.arity() {
            Arity::Fixed(count) if remaining.len() <= count => {
                let index = remaining.len() - 1;
                if !components_accept(parser, &remaining[..index]) {
                    return;
                }
                if !hidden {
                    out.push(Frontier::new(current, component.candidates(ctx, index, current)));
                }
                return;
            }
            Arity::Fixed(_) => {}
            Arity::Variadic { yielding } => {
                let end = if yielding {
                    remaining
                        .iter()
                        .position(|t| flags.is_boundary(t))
                        .unwrap_or(remaining.len())
                } else {
                    remaining.len()
                };
                if end == 0 {
                    return;
                }
                if end == remaining.len() {
                    let typed = remaining.join(" ");
                    if !hidden {
                        let candidates = component.candidates(ctx, 0, &typed);
                        out.push(Frontier::new(typed, candidates));
                    }
                    if liberal
                        && !flags.is_empty()
                        && (current.is_empty() || flags.is_boundary(current))
                    {
                        out.push(Frontier::new(current, flags.candidates(current, ctx)));
                    }
                    return;
                }
            }
        }

        if component.preprocess(ctx, remaining).is_err() {
            return;
        }
        let Ok((value, used)) = parser.parse(remaining, &|t| flags.is_boundary(t)) else {
            return;
        };
        tracing::trace!("suggest: <{}> took {} token(s)", component.name(), used);
        ctx.store(component.name(), value);
        self.suggest_children(Some(child), &child.children, tokens, start + used, ctx, out);
    }
}

fn preprocess<S>(
    node: &Node<S>,
    tokens: &[&str],
    pos: usize,
    ctx: &CommandContext<'_, S>,
) -> Result<(), Failed> {
    node.component
        .preprocess(ctx, &tokens[pos..])
        .map_err(|cause| {
            Failed::new(
                ParseFailure::Preprocessor {
                    argument: node.component.name().to_string(),
                    chain: tokens[..pos].join(" "),
                    cause,
                },
                pos,
            )
        })
}

fn validate_definition<S>(definition: &CommandDefinition<S>) -> Result<(), RegistrationError> {
    let components = &definition.components;
    let Some(root) = components.first() else {
        return Err(RegistrationError::EmptyPath);
    };
    if !root.is_literal() {
        return Err(RegistrationError::RootNotLiteral {
            name: root.name().to_string(),
        });
    }

    let mut seen_optional = false;
    for component in components {
        if component.is_literal() && !component.is_required() {
            return Err(RegistrationError::OptionalLiteral {
                name: component.name().to_string(),
            });
        }
        if component.is_required() && seen_optional {
            return Err(RegistrationError::RequiredAfterOptional {
                name: component.name().to_string(),
            });
        }
        seen_optional |= !component.is_required();
        check_range(component.name(), component.parser())?;

        if let Some(input) = component.default_input() {
            let default_tokens = tokenize(input);
            if let Err(rejection) = component.parser().parse(&default_tokens, &|_| false) {
                return Err(RegistrationError::InvalidDefault {
                    name: component.name().to_string(),
                    input: input.to_string(),
                    cause: rejection.cause,
                });
            }
        }
    }

    for (index, flag) in definition.flags.iter().enumerate() {
        if let Some(parser) = flag.value_parser() {
            check_range(flag.name(), parser)?;
        }
        if definition.flags[..index].iter().any(|f| f.clashes_with(flag)) {
            return Err(RegistrationError::ConflictingFlag {
                flag: flag.name().to_string(),
                syntax: root.name().to_string(),
            });
        }
    }
    Ok(())
}

fn check_range(name: &str, parser: &ArgumentParser) -> Result<(), RegistrationError> {
    match parser {
        ArgumentParser::Integer { min, max } if min > max => Err(RegistrationError::EmptyRange {
            name: name.to_string(),
            min: *min,
            max: *max,
        }),
        ArgumentParser::Compound { names, parsers } => names
            .iter()
            .zip(parsers)
            .try_for_each(|(name, parser)| check_range(name, parser)),
        _ => Ok(()),
    }
}

/// Reject `component` if a sibling other than `itself` could take the same input.
fn check_siblings<S>(
    parent: &str,
    siblings: &[Node<S>],
    component: &Component<S>,
    itself: Option<&Node<S>>,
) -> Result<(), AmbiguousNodeError> {
    let incoming = component.parser();
    for sibling in siblings {
        if itself.is_some_and(|n| std::ptr::eq(n, sibling)) {
            continue;
        }
        let existing = sibling.component.parser();
        let conflict = match (existing.is_literal(), incoming.is_literal()) {
            (true, true) => incoming
                .literal_names()
                .into_iter()
                .any(|name| existing.matches_literal(name)),
            (true, false) => literal_in_domain(existing, incoming),
            (false, true) => literal_in_domain(incoming, existing),
            (false, false) => existing.domain().overlaps(&incoming.domain()),
        };
        if conflict {
            return Err(AmbiguousNodeError {
                parent: parent.to_string(),
                existing: sibling.component.name().to_string(),
                new: component.name().to_string(),
            });
        }
    }
    Ok(())
}

fn literal_in_domain(literal: &ArgumentParser, argument: &ArgumentParser) -> bool {
    let domain = argument.domain();
    !domain.is_open() && literal.literal_names().into_iter().any(|n| domain.accepts(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Flag;

    #[test]
    fn failed_registration_leaves_tree_untouched() {
        let mut tree: CommandTree<()> = CommandTree::new();
        tree.insert(
            CommandDefinition::new("pick").argument("n", ArgumentParser::integer_range(1, 10)),
        )
        .unwrap();

        let err = tree
            .insert(
                CommandDefinition::new("pick")
                    .argument("m", ArgumentParser::integer_range(5, 20))
                    .literal("extra"),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::AmbiguousNode(_)));
        assert_eq!(tree.outline()[0].children.len(), 1);
    }

    #[test]
    fn empty_integer_ranges_are_rejected() {
        let mut tree: CommandTree<()> = CommandTree::new();
        let err = tree
            .insert(
                CommandDefinition::new("pick").argument("n", ArgumentParser::integer_range(10, 5)),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::EmptyRange {
                name: "n".into(),
                min: 10,
                max: 5
            }
        );

        let err = tree
            .insert(CommandDefinition::new("move").flag(Flag::valued(
                "to",
                ArgumentParser::compound([
                    ("x", ArgumentParser::integer()),
                    ("y", ArgumentParser::integer_range(1, 0)),
                ]),
            )))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyRange { name, .. } if name == "y"));
        assert!(tree.outline().is_empty());
    }

    #[test]
    fn outline_describes_nodes() {
        let mut tree: CommandTree<()> = CommandTree::new();
        tree.insert(
            CommandDefinition::root(Component::literal("test").alias("t")).literal("one"),
        )
        .unwrap();

        let outline = tree.outline();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].aliases, vec!["t"]);
        assert_eq!(outline[0].command, None);
        assert_eq!(outline[0].children[0].command.as_deref(), Some("test one"));
    }
}
