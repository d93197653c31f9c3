//! Command-line interface for instant-req.
//!
//! Without a subcommand the TUI runs. The subcommands render documents and
//! inspect stage lists headlessly, against the same storage the TUI uses.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::clipboard::ClipboardWriter;
use crate::config::Config;
use crate::render::render;
use crate::resolver::AgentResolver;
use crate::stages::{DocumentType, Stage, detect_placeholders};
use crate::store::{Storage, load_recent_agents, load_stages, reset_stages, save_recent_agent};

/// Instant-req: compose agent instruction prompts from staged templates.
#[derive(Parser, Debug)]
#[command(name = "instant-req")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Keep state in memory for this run instead of the configured database.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a prompt document and print it.
    Generate(GenerateArgs),

    /// Inspect or reset stored stage lists.
    #[command(subcommand)]
    Stages(StagesCommand),

    /// List agent placeholders referenced by a tab's stages.
    Placeholders(TabArgs),
}

#[derive(Subcommand, Debug)]
pub enum StagesCommand {
    /// Print the stage list.
    Show(ShowArgs),
    /// Clear the stored stage list so the defaults apply again.
    Reset(TabArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TabArgs {
    /// Document type: requirements or issues.
    #[arg(long, value_parser = parse_tab, default_value = "requirements")]
    pub tab: DocumentType,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub tab: TabArgs,

    /// Print the stored JSON form.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub tab: TabArgs,

    /// An item to list under the first stage. Repeatable.
    #[arg(long = "item")]
    pub items: Vec<String>,

    /// Read additional items from a file, one per line.
    #[arg(long)]
    pub items_file: Option<PathBuf>,

    /// Bind an agent placeholder: PLACEHOLDER=VALUE. Repeatable.
    #[arg(long = "agent", value_parser = parse_agent_binding)]
    pub agents: Vec<AgentBinding>,

    /// Also copy the document to the system clipboard.
    #[arg(long)]
    pub copy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentBinding {
    pub placeholder: String,
    pub value: String,
}

fn parse_tab(s: &str) -> Result<DocumentType, String> {
    DocumentType::parse(s).ok_or_else(|| format!("unknown tab '{}': use requirements or issues", s))
}

/// Parse `PLACEHOLDER=VALUE`. A missing `agent-` prefix is added.
pub fn parse_agent_binding(s: &str) -> Result<AgentBinding, String> {
    let (placeholder, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PLACEHOLDER=VALUE, got '{}'", s))?;
    let placeholder = placeholder.trim();
    if placeholder.is_empty() {
        return Err("placeholder name is empty".to_string());
    }
    let placeholder = if placeholder.starts_with("agent-") {
        placeholder.to_string()
    } else {
        format!("agent-{}", placeholder)
    };
    Ok(AgentBinding {
        placeholder,
        value: value.trim().to_string(),
    })
}

/// Run a headless subcommand, writing its output to `out`.
pub fn run(
    command: Command,
    storage: &dyn Storage,
    config: &Config,
    clipboard: &mut dyn ClipboardWriter,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Generate(args) => generate(args, storage, config, clipboard, out),
        Command::Stages(StagesCommand::Show(args)) => show_stages(args, storage, out),
        Command::Stages(StagesCommand::Reset(args)) => {
            reset_stages(storage, args.tab);
            writeln!(out, "{} stages reset to defaults", args.tab.label())?;
            Ok(())
        }
        Command::Placeholders(args) => {
            let (stages, _) = load_stages(storage, args.tab);
            for placeholder in detect_placeholders(&stages) {
                writeln!(out, "{}", placeholder)?;
            }
            Ok(())
        }
    }
}

fn generate(
    args: GenerateArgs,
    storage: &dyn Storage,
    config: &Config,
    clipboard: &mut dyn ClipboardWriter,
    out: &mut dyn Write,
) -> Result<()> {
    let tab = args.tab.tab;
    let mut items = args.items;
    if let Some(path) = &args.items_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read items file {}", path.display()))?;
        items.extend(text.lines().map(String::from));
    }

    let (stages, source) = load_stages(storage, tab);
    let mut resolver = AgentResolver::new(config.agents.clone());
    resolver.set_recent_agents(load_recent_agents(storage));
    resolver.detect(&stages);

    for binding in &args.agents {
        if !resolver.bind_value(&binding.placeholder, &binding.value) {
            bail!(
                "{} stages have no placeholder {{{}}}",
                tab.label(),
                binding.placeholder
            );
        }
    }

    let resolved = resolver.all_values();
    let document = render(&items, &stages, &resolved);
    info!(tab = %tab, source = ?source, bytes = document.len(), "cli_generate");
    if document.is_empty() {
        return Ok(());
    }

    write!(out, "{}", document)?;

    for value in resolved.values().filter(|v| v.starts_with('@')) {
        save_recent_agent(storage, value, config.history.recent_agents_limit);
    }

    if args.copy {
        clipboard
            .write_text(&document)
            .context("Failed to copy to clipboard")?;
    }
    Ok(())
}

fn show_stages(args: ShowArgs, storage: &dyn Storage, out: &mut dyn Write) -> Result<()> {
    let (stages, _) = load_stages(storage, args.tab.tab);
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&stages)?)?;
    } else {
        write!(out, "{}", format_stages(&stages))?;
    }
    Ok(())
}

/// Numbered outline of a stage list, substages indented beneath their stage.
pub fn format_stages(stages: &[Stage]) -> String {
    let mut text = String::new();
    for (index, stage) in stages.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", index + 1, stage.content));
        for sub in stage.substages() {
            text.push_str(&format!("   - {}\n", sub.content));
        }
    }
    text
}
