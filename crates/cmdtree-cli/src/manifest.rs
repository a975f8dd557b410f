use anyhow::{Context, Result, bail};
use cmdtree::meta::{CommandMeta, Location};
use cmdtree::{
    ArgumentParser, CommandDefinition, CommandTree, Component, Filter, Flag, FilteringProcessor,
    FlagMode, TreeSettings, reject_tokens,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST_NAME: &str = "cmdtree.json";

/// Commands are only parsed and suggested here, so the sender carries nothing.
pub type Sender = ();

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub flag_mode: FlagMode,

    #[serde(default)]
    pub filter: Filter,

    #[serde(default)]
    pub trim_before_last_space: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Components from the root literal onwards.
    pub path: Vec<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_from: Vec<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,

    #[serde(flatten)]
    pub parser: ParserSpec,

    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Fixed candidates replacing the parser's own suggestions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    /// First tokens refused before the argument is parsed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_from: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParserSpec {
    Literal {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        aliases: Vec<String>,
    },
    String,
    QuotedString,
    GreedyString,
    FlagYieldingString,
    StringArray {
        #[serde(default, rename = "flagYielding")]
        flag_yielding: bool,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Boolean {
        #[serde(default)]
        liberal: bool,
    },
    Enum {
        values: Vec<String>,
    },
    Compound {
        components: Vec<CompoundPart>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundPart {
    pub name: String,
    #[serde(flatten)]
    pub parser: ParserSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Absent for presence flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ParserSpec>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse manifest JSON: {}", path.display()))
    }

    /// Register every command, in manifest order.
    pub fn build_tree(&self) -> Result<CommandTree<Sender>> {
        let settings = TreeSettings {
            flag_mode: self.settings.flag_mode,
        };
        let mut processor = FilteringProcessor::new(self.settings.filter);
        if self.settings.trim_before_last_space {
            processor = processor.and_trim_before_last_space();
        }
        let mut tree = CommandTree::with_settings(settings).with_processor(processor);

        for (index, spec) in self.commands.iter().enumerate() {
            let definition = spec
                .to_definition()
                .with_context(|| format!("invalid command #{index}"))?;
            let command = tree
                .insert(definition)
                .with_context(|| format!("failed to register command #{index}"))?;
            tracing::debug!("registered '{}'", command.syntax());
        }
        Ok(tree)
    }
}

impl CommandSpec {
    fn to_definition(&self) -> Result<CommandDefinition<Sender>> {
        let Some((root, rest)) = self.path.split_first() else {
            bail!("command path is empty");
        };
        let mut definition = CommandDefinition::root(root.to_component()?);
        for component in rest {
            definition = definition.component(component.to_component()?);
        }
        for flag in &self.flags {
            definition = definition.flag(flag.to_flag()?);
        }

        let mut meta = CommandMeta::builder();
        if let Some(description) = &self.description {
            meta = meta.description(description.clone());
        }
        if !self.hidden_from.is_empty() {
            meta = meta.hidden_from(self.hidden_from.iter().copied());
        }
        Ok(definition.meta(meta.build()))
    }
}

impl ComponentSpec {
    fn to_component(&self) -> Result<Component<Sender>> {
        let mut component = match &self.parser {
            ParserSpec::Literal { aliases } => aliases
                .iter()
                .fold(Component::literal(&self.name), |c, alias| c.alias(alias)),
            parser => Component::argument(&self.name, parser.to_parser()?),
        };

        if let Some(default) = &self.default {
            component = component.with_default(default);
        } else if self.optional {
            component = component.optional();
        }
        if !self.suggestions.is_empty() {
            let candidates = self.suggestions.clone();
            component = component.with_suggestions(move |_ctx, _typed| candidates.clone());
        }
        if !self.reject.is_empty() {
            component = component.with_preprocessor(reject_tokens(self.reject.clone()));
        }
        for location in &self.hidden_from {
            component = component.hidden_from(*location);
        }
        Ok(component)
    }
}

impl FlagSpec {
    fn to_flag(&self) -> Result<Flag> {
        let flag = match &self.value {
            None => Flag::presence(&self.name),
            Some(parser) => Flag::valued(
                &self.name,
                parser
                    .to_parser()
                    .with_context(|| format!("invalid value for flag --{}", self.name))?,
            ),
        };
        Ok(self
            .aliases
            .iter()
            .fold(flag, |flag, alias| flag.with_alias(alias)))
    }
}

impl ParserSpec {
    pub fn to_parser(&self) -> Result<ArgumentParser> {
        Ok(match self {
            Self::Literal { .. } => bail!("literals can only appear in a command path"),
            Self::String => ArgumentParser::string(),
            Self::QuotedString => ArgumentParser::quoted_string(),
            Self::GreedyString => ArgumentParser::greedy_string(),
            Self::FlagYieldingString => ArgumentParser::flag_yielding_string(),
            Self::StringArray { flag_yielding } => ArgumentParser::string_array(*flag_yielding),
            Self::Integer { min, max } => {
                let min = min.unwrap_or(i64::MIN);
                let max = max.unwrap_or(i64::MAX);
                if min > max {
                    bail!("integer range is empty: {min}..={max}");
                }
                ArgumentParser::integer_range(min, max)
            }
            Self::Boolean { liberal } => ArgumentParser::boolean(*liberal),
            Self::Enum { values } => {
                if values.is_empty() {
                    bail!("enum needs at least one value");
                }
                ArgumentParser::enumeration(values.iter().cloned())
            }
            Self::Compound { components } => {
                let mut parts = Vec::with_capacity(components.len());
                for part in components {
                    if matches!(
                        part.parser,
                        Self::Compound { .. }
                            | Self::GreedyString
                            | Self::FlagYieldingString
                            | Self::StringArray { .. }
                    ) {
                        bail!("compound part '{}' must read a single token", part.name);
                    }
                    parts.push((part.name.clone(), part.parser.to_parser()?));
                }
                ArgumentParser::compound(parts)
            }
        })
    }
}

/// Write an example manifest into `dir`, failing if one is already there.
pub fn write_default_manifest(dir: &Path) -> Result<PathBuf> {
    let dest = dir.join(DEFAULT_MANIFEST_NAME);
    if dest.exists() {
        bail!("{} already exists in {}", DEFAULT_MANIFEST_NAME, dir.display());
    }

    let mut out =
        serde_json::to_string_pretty(&example_manifest()).context("failed to serialize manifest")?;
    out.push('\n');
    fs::write(&dest, out).with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(dest)
}

fn literal(name: &str) -> ComponentSpec {
    ComponentSpec {
        name: name.to_string(),
        parser: ParserSpec::Literal {
            aliases: Vec::new(),
        },
        optional: false,
        default: None,
        suggestions: Vec::new(),
        reject: Vec::new(),
        hidden_from: Vec::new(),
    }
}

fn argument(name: &str, parser: ParserSpec) -> ComponentSpec {
    ComponentSpec {
        parser,
        ..literal(name)
    }
}

fn example_manifest() -> Manifest {
    Manifest {
        schema_version: Some(1),
        settings: Settings::default(),
        commands: vec![
            CommandSpec {
                path: vec![
                    literal("greet"),
                    argument("name", ParserSpec::String),
                    ComponentSpec {
                        default: Some("1".to_string()),
                        ..argument(
                            "times",
                            ParserSpec::Integer {
                                min: Some(1),
                                max: Some(10),
                            },
                        )
                    },
                ],
                flags: vec![FlagSpec {
                    name: "loud".to_string(),
                    aliases: vec!["l".to_string()],
                    value: None,
                }],
                description: Some("Greet someone".to_string()),
                hidden_from: Vec::new(),
            },
            CommandSpec {
                path: vec![
                    literal("config"),
                    literal("set"),
                    argument(
                        "key",
                        ParserSpec::Enum {
                            values: vec!["color".to_string(), "verbose".to_string()],
                        },
                    ),
                    argument("value", ParserSpec::GreedyString),
                ],
                flags: Vec::new(),
                description: Some("Change a setting".to_string()),
                hidden_from: Vec::new(),
            },
            CommandSpec {
                path: vec![literal("debug")],
                flags: Vec::new(),
                description: Some("Internal diagnostics".to_string()),
                hidden_from: vec![Location::Suggestions, Location::Help],
            },
        ],
    }
}
