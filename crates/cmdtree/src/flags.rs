//! The flag sub-grammar: `--name [value]`, `-alias [value]` and bundles of
//! single-character presence aliases such as `-fst`.

use serde::{Deserialize, Serialize};

use crate::context::{CommandContext, FlagValue};
use crate::error::ParseFailure;
use crate::parser::{ArgumentParser, Arity, Value};
use crate::suggestion::Frontier;

/// How tokens starting with `-` end a preceding variable-arity argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagMode {
    /// Only tokens naming a declared flag are boundaries.
    #[default]
    Strict,
    /// Every dash-prefixed token is a boundary.
    Liberal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    name: String,
    aliases: Vec<String>,
    value: Option<ArgumentParser>,
}

impl Flag {
    /// A flag satisfied by its mere presence.
    pub fn presence(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            value: None,
        }
    }

    /// A flag followed by a value read with `parser`.
    pub fn valued(name: impl Into<String>, parser: ArgumentParser) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            value: Some(parser),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn value_parser(&self) -> Option<&ArgumentParser> {
        self.value.as_ref()
    }

    pub fn is_presence(&self) -> bool {
        self.value.is_none()
    }

    fn has_alias(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a == alias)
    }

    fn short_aliases(&self) -> impl Iterator<Item = char> + '_ {
        self.aliases.iter().filter_map(|alias| {
            let mut chars = alias.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Some(ch),
                _ => None,
            }
        })
    }

    /// `--name <value>` or `--name`, as shown in syntax strings.
    pub fn syntax(&self) -> String {
        match &self.value {
            Some(parser) => match parser.components() {
                Some((names, _)) => format!(
                    "[--{} {}]",
                    self.name,
                    names
                        .iter()
                        .map(|n| format!("<{n}>"))
                        .collect::<Vec<_>>()
                        .join(" ")
                ),
                None => format!("[--{} <{}>]", self.name, parser.kind()),
            },
            None => format!("[--{}]", self.name),
        }
    }

    /// Whether two flags could be confused on the same node.
    pub(crate) fn clashes_with(&self, other: &Flag) -> bool {
        self.name == other.name || self.aliases.iter().any(|a| other.has_alias(a))
    }
}

pub(crate) enum Resolved<'a> {
    Flag(&'a Flag),
    Bundle(Vec<&'a Flag>),
    Unknown,
}

/// The flags of one node, read under a [`FlagMode`].
#[derive(Clone, Copy)]
pub(crate) struct FlagSet<'a> {
    flags: &'a [Flag],
    mode: FlagMode,
}

impl<'a> FlagSet<'a> {
    pub(crate) fn new(flags: &'a [Flag], mode: FlagMode) -> Self {
        Self { flags, mode }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub(crate) fn resolve(&self, token: &str) -> Resolved<'a> {
        if let Some(name) = token.strip_prefix("--") {
            return match self.flags.iter().find(|f| f.name == name) {
                Some(flag) => Resolved::Flag(flag),
                None => Resolved::Unknown,
            };
        }
        let Some(body) = token.strip_prefix('-').filter(|b| !b.is_empty()) else {
            return Resolved::Unknown;
        };
        if let Some(flag) = self.flags.iter().find(|f| f.has_alias(body)) {
            return Resolved::Flag(flag);
        }

        let mut bundle = Vec::new();
        for ch in body.chars() {
            match self.flags.iter().find(|f| f.short_aliases().any(|c| c == ch)) {
                Some(flag) => bundle.push(flag),
                None => return Resolved::Unknown,
            }
        }
        Resolved::Bundle(bundle)
    }

    /// Whether `token` ends a flag-yielding argument and starts the flag section.
    pub(crate) fn is_boundary(&self, token: &str) -> bool {
        if self.flags.is_empty() {
            return false;
        }
        if token.starts_with("--") {
            return true;
        }
        if token.len() < 2 || !token.starts_with('-') {
            return false;
        }
        match self.mode {
            FlagMode::Liberal => true,
            FlagMode::Strict => !matches!(self.resolve(token), Resolved::Unknown),
        }
    }

    /// Parse flags from `tokens[start..]`.
    ///
    /// Returns the position after the last flag. With `stop_at_positional`
    /// the walk ends at the first non-flag token instead of failing on it.
    pub(crate) fn parse<S>(
        &self,
        tokens: &[&str],
        start: usize,
        ctx: &mut CommandContext<'_, S>,
        stop_at_positional: bool,
    ) -> Result<usize, ParseFailure> {
        let mut pos = start;
        while pos < tokens.len() {
            let token = tokens[pos];
            if !self.is_boundary(token) {
                if stop_at_positional {
                    return Ok(pos);
                }
                return Err(if token.starts_with('-') && token.len() > 1 {
                    ParseFailure::UnknownFlag {
                        token: token.to_string(),
                    }
                } else {
                    ParseFailure::NoFlagStarted {
                        token: token.to_string(),
                    }
                });
            }

            match self.resolve(token) {
                Resolved::Unknown => {
                    return Err(ParseFailure::UnknownFlag {
                        token: token.to_string(),
                    });
                }
                Resolved::Flag(flag) => {
                    if ctx.has_flag(&flag.name) {
                        return Err(ParseFailure::DuplicateFlag {
                            flag: flag.name.clone(),
                        });
                    }
                    match &flag.value {
                        None => {
                            ctx.store_flag(&flag.name, FlagValue::Present);
                            pos += 1;
                        }
                        Some(parser) => {
                            let rest = &tokens[pos + 1..];
                            if rest.is_empty() {
                                return Err(ParseFailure::MissingFlagValue {
                                    flag: flag.name.clone(),
                                });
                            }
                            let (value, used) = parser
                                .parse(rest, &|t| self.is_boundary(t))
                                .map_err(|rejection| ParseFailure::FlagValue {
                                    flag: flag.name.clone(),
                                    cause: rejection.cause,
                                })?;
                            tracing::trace!("flag --{} took {} token(s)", flag.name, used);
                            ctx.store_flag(&flag.name, FlagValue::Value(value));
                            pos += 1 + used;
                        }
                    }
                }
                Resolved::Bundle(bundle) => {
                    for flag in bundle {
                        if !flag.is_presence() {
                            return Err(ParseFailure::AmbiguousFlag {
                                token: token.to_string(),
                                flag: flag.name.clone(),
                            });
                        }
                        if ctx.has_flag(&flag.name) {
                            return Err(ParseFailure::DuplicateFlag {
                                flag: flag.name.clone(),
                            });
                        }
                        ctx.store_flag(&flag.name, FlagValue::Present);
                    }
                    pos += 1;
                }
            }
        }
        Ok(pos)
    }

    /// Collect suggestions for the last of `tokens`, replaying the earlier
    /// tokens as flags. Unrecognised tokens are skipped.
    pub(crate) fn suggest<S>(
        &self,
        tokens: &[&str],
        ctx: &mut CommandContext<'_, S>,
        out: &mut Vec<Frontier>,
    ) {
        let Some((current, complete)) = tokens.split_last() else {
            return;
        };

        let mut pos = 0;
        while pos < complete.len() {
            match self.resolve(complete[pos]) {
                Resolved::Flag(flag) => match &flag.value {
                    None => {
                        ctx.store_flag(&flag.name, FlagValue::Present);
                        pos += 1;
                    }
                    Some(parser) => match self.replay_value(parser, &tokens[pos + 1..]) {
                        ValueReplay::Typing(frontier) => {
                            if let Some(frontier) = frontier {
                                out.push(frontier);
                            }
                            return;
                        }
                        ValueReplay::Parsed(value, used) => {
                            ctx.store_flag(&flag.name, FlagValue::Value(value));
                            pos += 1 + used;
                        }
                        ValueReplay::Invalid => return,
                    },
                },
                Resolved::Bundle(bundle) => {
                    for flag in bundle.into_iter().filter(|f| f.is_presence()) {
                        ctx.store_flag(&flag.name, FlagValue::Present);
                    }
                    pos += 1;
                }
                Resolved::Unknown => pos += 1,
            }
        }

        out.push(Frontier::new(*current, self.candidates(current, ctx)));
    }

    /// Replay the value of a flag. `tokens` runs from the first value token up
    /// to and including the token being typed.
    fn replay_value(&self, parser: &ArgumentParser, tokens: &[&str]) -> ValueReplay {
        let Some((current, complete)) = tokens.split_last() else {
            return ValueReplay::Invalid;
        };
        match parser.arity() {
            Arity::Fixed(count) if complete.len() < count => {
                let index = complete.len();
                if !components_accept(parser, complete) {
                    return ValueReplay::Typing(None);
                }
                ValueReplay::Typing(Some(Frontier::new(
                    *current,
                    parser.component_suggestions(index, current),
                )))
            }
            Arity::Fixed(_) => match parser.parse(complete, &|t| self.is_boundary(t)) {
                Ok((value, used)) => ValueReplay::Parsed(value, used),
                Err(_) => ValueReplay::Invalid,
            },
            Arity::Variadic { yielding } => {
                let end = if yielding {
                    tokens
                        .iter()
                        .position(|t| self.is_boundary(t))
                        .unwrap_or(tokens.len())
                } else {
                    tokens.len()
                };
                if end == tokens.len() {
                    let typed = tokens.join(" ");
                    let candidates = parser.suggestions(&typed);
                    return ValueReplay::Typing(Some(Frontier::new(typed, candidates)));
                }
                match parser.parse(&tokens[..end], &|t| self.is_boundary(t)) {
                    Ok((value, used)) => ValueReplay::Parsed(value, used),
                    Err(_) => ValueReplay::Invalid,
                }
            }
        }
    }

    /// Candidates for a token in flag position.
    pub(crate) fn candidates<S>(&self, current: &str, ctx: &CommandContext<'_, S>) -> Vec<String> {
        let single_dash = current.starts_with('-') && !current.starts_with("--");
        if single_dash {
            // Used or repeated flags fall through to the remaining-flags list.
            match self.resolve(current) {
                Resolved::Flag(flag) if ctx.has_flag(&flag.name) => {}
                Resolved::Flag(flag) if flag.is_presence() && current.chars().count() == 2 => {
                    return self.bundle_candidates(current, &[flag], ctx);
                }
                Resolved::Flag(_) => return vec![current.to_string()],
                Resolved::Bundle(bundle) if is_fresh_bundle(&bundle, ctx) => {
                    return self.bundle_candidates(current, &bundle, ctx);
                }
                _ => {}
            }
        }

        let remaining: Vec<&Flag> = self
            .flags
            .iter()
            .filter(|f| !ctx.has_flag(&f.name))
            .collect();
        let mut out: Vec<String> = remaining.iter().map(|f| format!("--{}", f.name)).collect();
        for flag in &remaining {
            out.extend(flag.aliases.iter().map(|a| format!("-{a}")));
        }
        out
    }

    fn bundle_candidates<S>(
        &self,
        current: &str,
        bundle: &[&Flag],
        ctx: &CommandContext<'_, S>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for flag in self.flags.iter().filter(|f| f.is_presence()) {
            let in_bundle = bundle.iter().any(|b| b.name == flag.name);
            if in_bundle || ctx.has_flag(&flag.name) {
                continue;
            }
            out.extend(flag.short_aliases().map(|ch| format!("{current}{ch}")));
        }
        out.push(current.to_string());
        out
    }
}

/// Presence flags only, none repeated and none already set.
fn is_fresh_bundle<S>(bundle: &[&Flag], ctx: &CommandContext<'_, S>) -> bool {
    bundle.iter().enumerate().all(|(index, flag)| {
        flag.is_presence()
            && !ctx.has_flag(&flag.name)
            && !bundle[..index].iter().any(|f| f.name == flag.name)
    })
}

enum ValueReplay {
    /// The token being typed belongs to the value.
    Typing(Option<Frontier>),
    Parsed(Value, usize),
    Invalid,
}

/// Whether every already-typed token of a compound value parses.
pub(crate) fn components_accept(parser: &ArgumentParser, complete: &[&str]) -> bool {
    let Some((_, parsers)) = parser.components() else {
        return true;
    };
    complete
        .iter()
        .zip(parsers)
        .all(|(token, component)| component.parse(&[*token], &|_| false).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> Vec<Flag> {
        vec![
            Flag::presence("first").with_alias("f"),
            Flag::presence("second").with_alias("s"),
            Flag::valued("size", ArgumentParser::integer()).with_alias("z"),
        ]
    }

    #[test]
    fn resolves_names_aliases_and_bundles() {
        let flags = flags();
        let set = FlagSet::new(&flags, FlagMode::Strict);
        assert!(matches!(set.resolve("--first"), Resolved::Flag(f) if f.name() == "first"));
        assert!(matches!(set.resolve("-z"), Resolved::Flag(f) if f.name() == "size"));
        assert!(matches!(set.resolve("-sf"), Resolved::Bundle(b) if b.len() == 2));
        assert!(matches!(set.resolve("-fx"), Resolved::Unknown));
        assert!(matches!(set.resolve("-"), Resolved::Unknown));
    }

    #[test]
    fn boundaries_depend_on_mode() {
        let flags = flags();
        let strict = FlagSet::new(&flags, FlagMode::Strict);
        let liberal = FlagSet::new(&flags, FlagMode::Liberal);

        assert!(strict.is_boundary("--anything"));
        assert!(strict.is_boundary("-fs"));
        assert!(!strict.is_boundary("-x"));
        assert!(!strict.is_boundary("-"));
        assert!(liberal.is_boundary("-x"));
        assert!(!liberal.is_boundary("-"));
        assert!(!FlagSet::new(&[], FlagMode::Liberal).is_boundary("--x"));
    }

    #[test]
    fn parses_bundles_and_values() {
        let flags = flags();
        let set = FlagSet::new(&flags, FlagMode::Strict);
        let sender = ();
        let mut ctx = CommandContext::new(&sender, "");

        let end = set.parse(&["-fs", "--size", "12"], 0, &mut ctx, false).unwrap();
        assert_eq!(end, 3);
        assert_eq!(ctx.flag("first"), Some(&FlagValue::Present));
        assert_eq!(
            ctx.flag("size").and_then(FlagValue::value),
            Some(&Value::Integer(12))
        );
    }

    #[test]
    fn flag_errors() {
        let flags = flags();
        let set = FlagSet::new(&flags, FlagMode::Strict);
        let sender = ();
        let run = |tokens: &[&str]| {
            let mut ctx = CommandContext::new(&sender, "");
            set.parse(tokens, 0, &mut ctx, false).unwrap_err()
        };

        assert!(matches!(run(&["-f", "-f"]), ParseFailure::DuplicateFlag { .. }));
        assert!(matches!(run(&["--size"]), ParseFailure::MissingFlagValue { .. }));
        assert!(matches!(run(&["--size", "x"]), ParseFailure::FlagValue { .. }));
        assert!(matches!(run(&["-fz"]), ParseFailure::AmbiguousFlag { .. }));
        assert!(matches!(run(&["--nope"]), ParseFailure::UnknownFlag { .. }));
        assert!(matches!(run(&["word"]), ParseFailure::NoFlagStarted { .. }));
    }

    #[test]
    fn candidates_exclude_satisfied_flags() {
        let flags = flags();
        let set = FlagSet::new(&flags, FlagMode::Strict);
        let sender = ();
        let mut ctx = CommandContext::new(&sender, "");
        ctx.store_flag("second", FlagValue::Present);

        assert_eq!(set.candidates("", &ctx), vec!["--first", "--size", "-f", "-z"]);
        assert_eq!(set.candidates("-f", &ctx), vec!["-f"]);
        assert_eq!(set.candidates("-z", &ctx), vec!["-z"]);
    }

    #[test]
    fn flag_syntax() {
        let flags = flags();
        assert_eq!(flags[0].syntax(), "[--first]");
        assert_eq!(flags[2].syntax(), "[--size <integer>]");
    }
}
