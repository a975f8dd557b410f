//! Tree positions and the components they are built from.

use std::fmt;
use std::sync::Arc;

use cmdtree_meta::{CommandMeta, Location};

use crate::command::Command;
use crate::context::CommandContext;
use crate::error::PreprocessError;
use crate::flags::Flag;
use crate::parser::ArgumentParser;

/// Supplies candidates for an argument, replacing its parser's own.
pub type SuggestionProvider<S> =
    Arc<dyn Fn(&CommandContext<'_, S>, &str) -> Vec<String> + Send + Sync>;

/// Inspects the remaining tokens before an argument is parsed and may reject them.
pub type Preprocessor<S> =
    Arc<dyn Fn(&CommandContext<'_, S>, &[&str]) -> Result<(), PreprocessError> + Send + Sync>;

/// One step of a command path: a literal or a named argument.
pub struct Component<S> {
    name: String,
    parser: ArgumentParser,
    required: bool,
    default: Option<String>,
    suggestions: Option<SuggestionProvider<S>>,
    preprocessors: Vec<Preprocessor<S>>,
    hidden_from: Vec<Location>,
}

impl<S> Component<S> {
    pub fn literal(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::argument(name.clone(), ArgumentParser::literal(name))
    }

    pub fn argument(name: impl Into<String>, parser: ArgumentParser) -> Self {
        Self {
            name: name.into(),
            parser,
            required: true,
            default: None,
            suggestions: None,
            preprocessors: Vec::new(),
            hidden_from: Vec::new(),
        }
    }

    /// Add an alternate name to a literal. No effect on arguments.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        if let ArgumentParser::Literal { aliases, .. } = &mut self.parser {
            aliases.push(alias.into());
        }
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Optional, with `input` parsed as the value when the argument is omitted.
    pub fn with_default(mut self, input: impl Into<String>) -> Self {
        self.required = false;
        self.default = Some(input.into());
        self
    }

    pub fn with_suggestions<F>(mut self, provider: F) -> Self
    where
        F: Fn(&CommandContext<'_, S>, &str) -> Vec<String> + Send + Sync + 'static,
    {
        self.suggestions = Some(Arc::new(provider));
        self
    }

    pub fn with_preprocessor<F>(mut self, preprocessor: F) -> Self
    where
        F: Fn(&CommandContext<'_, S>, &[&str]) -> Result<(), PreprocessError>
            + Send
            + Sync
            + 'static,
    {
        self.preprocessors.push(Arc::new(preprocessor));
        self
    }

    pub fn hidden_from(mut self, location: Location) -> Self {
        if !self.hidden_from.contains(&location) {
            self.hidden_from.push(location);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parser(&self) -> &ArgumentParser {
        &self.parser
    }

    pub fn is_literal(&self) -> bool {
        self.parser.is_literal()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_input(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn hidden_locations(&self) -> &[Location] {
        &self.hidden_from
    }

    pub(crate) fn candidates(
        &self,
        ctx: &CommandContext<'_, S>,
        index: usize,
        typed: &str,
    ) -> Vec<String> {
        match &self.suggestions {
            Some(provider) => provider(ctx, typed),
            None => self.parser.component_suggestions(index, typed),
        }
    }

    pub(crate) fn preprocess(
        &self,
        ctx: &CommandContext<'_, S>,
        tokens: &[&str],
    ) -> Result<(), PreprocessError> {
        self.preprocessors
            .iter()
            .try_for_each(|preprocessor| preprocessor(ctx, tokens))
    }

    /// Whether a registered node for `self` can be reused for `other`.
    pub(crate) fn same_position(&self, other: &Component<S>) -> bool {
        match (&self.parser, &other.parser) {
            (ArgumentParser::Literal { name: a, .. }, ArgumentParser::Literal { name: b, .. }) => {
                a == b
            }
            (a, b) => self.name == other.name && a == b && self.required == other.required,
        }
    }

    /// Fold the aliases and visibility of `other` into a reused literal node.
    pub(crate) fn merge(&mut self, other: &Component<S>) {
        if let (
            ArgumentParser::Literal { aliases, .. },
            ArgumentParser::Literal {
                aliases: incoming, ..
            },
        ) = (&mut self.parser, &other.parser)
        {
            for alias in incoming {
                if !aliases.contains(alias) {
                    aliases.push(alias.clone());
                }
            }
        }
        self.preprocessors
            .extend(other.preprocessors.iter().cloned());
        if self.suggestions.is_none() {
            self.suggestions = other.suggestions.clone();
        }
        for location in &other.hidden_from {
            if !self.hidden_from.contains(location) {
                self.hidden_from.push(*location);
            }
        }
    }
}

impl<S> Clone for Component<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            parser: self.parser.clone(),
            required: self.required,
            default: self.default.clone(),
            suggestions: self.suggestions.clone(),
            preprocessors: self.preprocessors.clone(),
            hidden_from: self.hidden_from.clone(),
        }
    }
}

impl<S> fmt::Debug for Component<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("parser", &self.parser)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("suggestions", &self.suggestions.is_some())
            .field("preprocessors", &self.preprocessors.len())
            .field("hidden_from", &self.hidden_from)
            .finish()
    }
}

/// A position in the tree. Owned by its parent; roots are owned by the tree.
pub(crate) struct Node<S> {
    pub(crate) component: Component<S>,
    pub(crate) children: Vec<Node<S>>,
    pub(crate) command: Option<Arc<Command<S>>>,
    pub(crate) flags: Vec<Flag>,
    owners: usize,
    hidden_owners: [usize; 2],
}

impl<S> Node<S> {
    pub(crate) fn new(component: Component<S>) -> Self {
        Self {
            component,
            children: Vec::new(),
            command: None,
            flags: Vec::new(),
            owners: 0,
            hidden_owners: [0; 2],
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Hidden when the component itself is, or when every command passing
    /// through this node is.
    pub(crate) fn is_hidden_from(&self, location: Location) -> bool {
        self.component.hidden_from.contains(&location)
            || (self.owners > 0 && self.hidden_owners[location.index()] == self.owners)
    }

    pub(crate) fn record_owner(&mut self, meta: &CommandMeta) {
        self.owners += 1;
        for location in Location::ALL {
            if meta.is_hidden_from(location) {
                self.hidden_owners[location.index()] += 1;
            }
        }
    }

    /// Insert a child keeping literals first, sorted by name, then arguments
    /// in registration order. Returns the child's index.
    pub(crate) fn insert_child(children: &mut Vec<Node<S>>, node: Node<S>) -> usize {
        let index = if node.component.is_literal() {
            children
                .iter()
                .position(|c| !c.component.is_literal() || c.component.name > node.component.name)
                .unwrap_or(children.len())
        } else {
            children.len()
        };
        children.insert(index, node);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_keep_literals_sorted_before_arguments() {
        let mut children: Vec<Node<()>> = Vec::new();
        Node::insert_child(
            &mut children,
            Node::new(Component::argument("n", ArgumentParser::integer())),
        );
        Node::insert_child(&mut children, Node::new(Component::literal("two")));
        Node::insert_child(&mut children, Node::new(Component::literal("one")));
        Node::insert_child(
            &mut children,
            Node::new(Component::argument("s", ArgumentParser::string())),
        );

        let names: Vec<&str> = children.iter().map(|c| c.component.name()).collect();
        assert_eq!(names, vec!["one", "two", "n", "s"]);
    }

    #[test]
    fn node_hidden_when_every_owner_is() {
        let mut node: Node<()> = Node::new(Component::literal("x"));
        let hidden = CommandMeta::builder()
            .hidden_from([Location::Suggestions])
            .build();
        node.record_owner(&hidden);
        assert!(node.is_hidden_from(Location::Suggestions));
        assert!(!node.is_hidden_from(Location::Help));

        node.record_owner(&CommandMeta::empty());
        assert!(!node.is_hidden_from(Location::Suggestions));
    }

    #[test]
    fn merging_literals_collects_aliases() {
        let mut first: Component<()> = Component::literal("test").alias("t");
        let second = Component::literal("test").alias("testalias").alias("t");
        assert!(first.same_position(&second));
        first.merge(&second);
        assert_eq!(first.parser().literal_names(), vec!["test", "t", "testalias"]);
    }
}
