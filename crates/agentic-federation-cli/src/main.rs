//! AgenticFederation CLI: `afed` command.
//!
//! Operator tooling around a federation host: inspect and create the
//! configuration file, check identifiers, and review the push failure
//! records left behind by external actions that could not be delivered.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use agentic_federation::push::{FailureId, FailureStore};
use agentic_federation::storage::FileFailureStore;
use agentic_federation::time::micros_to_rfc3339;
use agentic_federation::{FederationConfig, HostIdentifier, InternalIdentifier};

// ── Directory helpers ─────────────────────────────────────────────────────────

fn agentic_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home).join(".agentic"))
}

fn default_config_path() -> Result<PathBuf> {
    Ok(agentic_dir()?.join("federation.json"))
}

fn default_failure_dir() -> Result<PathBuf> {
    Ok(agentic_dir()?.join("federation").join("failures"))
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// AgenticFederation CLI: operate a federation host.
#[derive(Parser, Debug)]
#[command(
    name = "afed",
    about = "AgenticFederation CLI",
    version,
    long_about = "afed: AgenticFederation CLI\n\nInspect host configuration, validate identifiers and manage\nthe failure records of undeliverable external actions."
)]
struct Cli {
    /// Configuration file (default: ~/.agentic/federation.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show or create the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigCommands,
    },

    /// Validate identifiers
    Identifier {
        #[command(subcommand)]
        subcommand: IdentifierCommands,
    },

    /// Manage push failure records
    Failures {
        #[command(subcommand)]
        subcommand: FailureCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum IdentifierCommands {
    /// Check whether a value is a valid host or internal identifier
    Check {
        /// e.g. example.org or alice@example.org
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum FailureCommands {
    /// List failure records
    List,
    /// Show one failure record
    Show {
        /// Failure ID (afail_...)
        failure_id: String,
    },
    /// Delete a failure record without resending it
    Discard {
        /// Failure ID (afail_...)
        failure_id: String,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = resolve_config_path(cli.config).and_then(|config_path| match cli.command {
        Commands::Config { subcommand } => match subcommand {
            ConfigCommands::Show => cmd_config_show(&config_path, verbose),
            ConfigCommands::Init { force } => cmd_config_init(&config_path, force),
        },
        Commands::Identifier { subcommand } => match subcommand {
            IdentifierCommands::Check { value } => cmd_identifier_check(&value),
        },
        Commands::Failures { subcommand } => match subcommand {
            FailureCommands::List => cmd_failures_list(&config_path, verbose),
            FailureCommands::Show { failure_id } => cmd_failures_show(&config_path, &failure_id),
            FailureCommands::Discard { failure_id } => {
                cmd_failures_discard(&config_path, &failure_id)
            }
        },
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

/// Load the configuration; a missing file means defaults.
fn load_config(path: &Path) -> Result<FederationConfig> {
    if !path.exists() {
        log::debug!("{} not found, using defaults", path.display());
        return Ok(FederationConfig::default());
    }
    FederationConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn open_failure_store(config_path: &Path) -> Result<FileFailureStore> {
    let config = load_config(config_path)?;
    let dir = match config.push.failure_dir {
        Some(dir) => dir,
        None => default_failure_dir()?,
    };
    FileFailureStore::new(&dir)
        .with_context(|| format!("failed to open failure store at {}", dir.display()))
}

fn parse_failure_id(s: &str) -> Result<FailureId> {
    if !s.starts_with("afail_") || s.len() <= "afail_".len() {
        bail!("invalid failure ID '{s}' (expected afail_...)");
    }
    Ok(FailureId(s.to_string()))
}

// ── Command implementations ───────────────────────────────────────────────────

/// `afed config show`
fn cmd_config_show(path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(path)?;
    if verbose {
        println!("# {}", path.display());
    }
    let json = serde_json::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{json}");
    Ok(())
}

/// `afed config init [--force]`
fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "configuration already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create configuration directory")?;
    }
    FederationConfig::default()
        .save(path)
        .context("failed to write configuration")?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// `afed identifier check VALUE`
fn cmd_identifier_check(value: &str) -> Result<()> {
    if value.contains('@') {
        let id = InternalIdentifier::new(value)
            .map_err(|e| anyhow!("'{value}' is not a valid internal identifier: {e}"))?;
        println!("Internal identifier");
        println!("  Local: {}", id.local());
        println!("  Host:  {}", id.host());
    } else {
        let host = HostIdentifier::new(value)
            .map_err(|e| anyhow!("'{value}' is not a valid host identifier: {e}"))?;
        println!("Host identifier: {host}");
    }
    Ok(())
}

/// `afed failures list`
fn cmd_failures_list(config_path: &Path, verbose: bool) -> Result<()> {
    let store = open_failure_store(config_path)?;
    let ids = store.list().context("failed to list failure records")?;
    if ids.is_empty() {
        println!("No failure records.");
        return Ok(());
    }

    println!("{} failure record(s):", ids.len());
    for id in &ids {
        let record = store
            .load(id)
            .with_context(|| format!("failed to load failure record {id}"))?;
        println!(
            "  {}  {}  {} attempt(s)  {}",
            record.id,
            record.recipient,
            record.attempts,
            micros_to_rfc3339(record.failed_at)
        );
        if verbose {
            println!("      {}: {}", record.action.method_type, record.last_error);
        }
    }
    Ok(())
}

/// `afed failures show ID`
fn cmd_failures_show(config_path: &Path, id: &str) -> Result<()> {
    let id = parse_failure_id(id)?;
    let store = open_failure_store(config_path)?;
    let record = store
        .load(&id)
        .with_context(|| format!("failure record {id} not found"))?;

    println!("Failure: {}", record.id);
    println!("  Delivery:  {}", record.token);
    println!("  Recipient: {}", record.recipient);
    println!("  Action:    {} ({})", record.action.id, record.action.method_type);
    println!("  Subject:   {}", record.action.subject);
    println!("  Attempts:  {}", record.attempts);
    println!("  Failed at: {}", micros_to_rfc3339(record.failed_at));
    println!("  Error:     {}", record.last_error);
    Ok(())
}

/// `afed failures discard ID`
fn cmd_failures_discard(config_path: &Path, id: &str) -> Result<()> {
    let id = parse_failure_id(id)?;
    let store = open_failure_store(config_path)?;
    store
        .load(&id)
        .with_context(|| format!("failure record {id} not found"))?;
    store
        .delete(&id)
        .with_context(|| format!("failed to delete failure record {id}"))?;
    println!("Discarded {id}");
    Ok(())
}
