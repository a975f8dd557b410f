mod manifest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdtree::meta::Location;
use cmdtree::{Arguments, CommandTree};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

use crate::manifest::{DEFAULT_MANIFEST_NAME, Manifest, Sender};

#[derive(Parser)]
#[command(name = "cmdtree")]
#[command(version, about = "Parse and complete commands described by a JSON manifest", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example cmdtree.json
    Init(InitArgs),

    /// Parse a complete input line and print the bound arguments as JSON
    Parse(InputArgs),

    /// Print completions for a partial input line
    Suggest(SuggestArgs),

    /// List registered commands that are not hidden from help
    List(ListArgs),

    /// Validate the manifest and print the command tree as JSON
    Check(ManifestArgs),
}

#[derive(Parser)]
struct InitArgs {
    /// Directory to write into (default: current directory)
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,
}

#[derive(Parser)]
struct ManifestArgs {
    /// Path to the manifest
    #[arg(short, long, default_value = DEFAULT_MANIFEST_NAME, value_name = "FILE")]
    manifest: PathBuf,
}

#[derive(Parser)]
struct ListArgs {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Print a JSON array of entries
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct InputArgs {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Input line, quoted as one shell argument
    #[arg(value_name = "INPUT", allow_hyphen_values = true)]
    input: String,
}

#[derive(Parser)]
struct SuggestArgs {
    #[command(flatten)]
    target: InputArgs,

    /// Print a JSON array instead of one suggestion per line
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ParseReport<'a> {
    command: String,
    arguments: &'a Arguments,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    syntax: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => init(args),
        Commands::Parse(args) => parse(args),
        Commands::Suggest(args) => suggest(args),
        Commands::List(args) => list(args),
        Commands::Check(args) => check(args),
    }
}

fn init(args: InitArgs) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let manifest_path = manifest::write_default_manifest(&dir)?;

    eprintln!("Created: {}", manifest_path.display());
    eprintln!("\nNext steps:");
    eprintln!("  1. Edit {DEFAULT_MANIFEST_NAME} to describe your commands");
    eprintln!("  2. Run: cmdtree check");
    eprintln!("  3. Run: cmdtree suggest \"greet \"");

    Ok(())
}

fn load_tree(args: &ManifestArgs) -> Result<CommandTree<Sender>> {
    let manifest = Manifest::from_file(&args.manifest)?;
    let tree = manifest.build_tree()?;
    tracing::debug!(
        "loaded {} commands from {}",
        tree.commands().len(),
        args.manifest.display()
    );
    Ok(tree)
}

fn parse(args: InputArgs) -> Result<()> {
    let tree = load_tree(&args.manifest)?;
    let bound = tree
        .parse(&(), &args.input)
        .with_context(|| format!("failed to parse '{}'", args.input))?;

    let report = ParseReport {
        command: bound.command().syntax(),
        arguments: bound.arguments(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn suggest(args: SuggestArgs) -> Result<()> {
    let tree = load_tree(&args.target.manifest)?;
    let suggestions = tree.suggest(&(), &args.target.input);

    if args.json {
        println!("{}", serde_json::to_string(&suggestions)?);
    } else {
        for suggestion in suggestions {
            println!("{suggestion}");
        }
    }
    Ok(())
}

fn list(args: ListArgs) -> Result<()> {
    let tree = load_tree(&args.manifest)?;
    let entries: Vec<ListEntry> = tree
        .commands()
        .iter()
        .filter(|command| !command.is_hidden_from(Location::Help))
        .map(|command| ListEntry {
            syntax: command.syntax(),
            description: command.description(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        match &entry.description {
            Some(description) => println!("{}\n    {}", entry.syntax, description),
            None => println!("{}", entry.syntax),
        }
    }
    Ok(())
}

fn check(args: ManifestArgs) -> Result<()> {
    let tree = load_tree(&args)?;
    let outline = tree.outline();
    println!("{}", serde_json::to_string_pretty(&outline)?);
    eprintln!(
        "OK: {} commands in {}",
        tree.commands().len(),
        args.manifest.display()
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
