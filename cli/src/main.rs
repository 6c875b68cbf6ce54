//! edgeward operator CLI
//!
//! Compiles and decompiles filter expressions offline, applies desired-state
//! payloads to Cloudflare, and prints the current policy of zones.
//!
//! Usage:
//!   edgeward compile --domain api.example.com --file conditions.json
//!   edgeward decompile --expression '(ip.src in {1.2.3.4} and http.host eq "api.example.com")'
//!   edgeward apply --kind blacklist --file payload.json --journal journal.json
//!   edgeward show --kind waf --zone example.com

mod config;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgeward_audit::InMemoryJournal;
use edgeward_cloudflare::CloudflareClient;
use edgeward_contracts::{
    condition::Condition,
    error::{EdgewardError, EdgewardResult},
};
use edgeward_expr::{compile, decompile, partition};
use edgeward_service::{DomainReport, PolicyReader, PolicyService};

use crate::config::FileConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

/// edgeward: keeps tagged WAF, bot, cache and DDoS rules converged.
#[derive(Parser)]
#[command(name = "edgeward", about = "Per-domain edge rule reconciler")]
struct Cli {
    /// Configuration file. A missing file means defaults.
    #[arg(long, global = true, default_value = "edgeward.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the expression for a flat condition list.
    Compile {
        #[arg(long)]
        domain: String,
        /// JSON array of conditions.
        #[arg(long)]
        file: PathBuf,
    },
    /// Print `{host, groups, skipped}` for an expression.
    Decompile {
        #[arg(long)]
        expression: String,
    },
    /// Converge the rules described by a payload file.
    Apply {
        #[arg(long, value_enum)]
        kind: ApplyKind,
        #[arg(long)]
        file: PathBuf,
        /// Write the hash-chained change journal of the run here.
        #[arg(long)]
        journal: Option<PathBuf>,
    },
    /// Print the current policy of one or more zones.
    Show {
        #[arg(long, value_enum)]
        kind: ShowKind,
        #[arg(long = "zone", required = true)]
        zones: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ApplyKind {
    Blacklist,
    Whitelist,
    Country,
    KnownBot,
    VerifiedBot,
    Custom,
    Cache,
    Ddos,
    /// Remove the IP, country and cache rules of deleted subdomains.
    DeleteSubdomain,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowKind {
    Waf,
    Bot,
    Custom,
    Cache,
    Ddos,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for every remote call.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("edgeward: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> EdgewardResult<()> {
    match cli.command {
        Command::Compile { domain, file } => {
            let conditions: Vec<Condition> = read_json(&file)?;
            println!("{}", compile(&partition(conditions), &domain)?);
            Ok(())
        }
        Command::Decompile { expression } => print_json(&decompile(&expression)?),
        Command::Apply { kind, file, journal } => {
            let client = connect(&cli.config)?;
            let log = InMemoryJournal::new(format!("edgeward-{}", std::process::id()));
            let reports = apply(&PolicyService::new(&client, &log), kind, &file).await?;
            print_json(&reports)?;
            if let Some(path) = journal {
                write_journal(&log, &path)?;
            }
            Ok(())
        }
        Command::Show { kind, zones } => {
            let client = connect(&cli.config)?;
            let reader = PolicyReader::new(&client);
            match kind {
                ShowKind::Waf => print_json(&reader.waf_view(&zones).await?),
                ShowKind::Bot => print_json(&reader.bot_view(&zones).await?),
                ShowKind::Custom => print_json(&reader.custom_view(&zones).await?),
                ShowKind::Cache => print_json(&reader.cache_view(&zones).await?),
                ShowKind::Ddos => print_json(&reader.ddos_view(&zones).await?),
            }
        }
    }
}

async fn apply(service: &PolicyService<'_>, kind: ApplyKind, file: &Path) -> EdgewardResult<Vec<DomainReport>> {
    match kind {
        ApplyKind::Blacklist => service.apply_blacklist(&read_json(file)?).await,
        ApplyKind::Whitelist => service.apply_whitelist(&read_json(file)?).await,
        ApplyKind::Country => service.apply_country(&read_json(file)?).await,
        ApplyKind::KnownBot => service.apply_known_bot(&read_json(file)?).await,
        ApplyKind::VerifiedBot => service.apply_verified_bot(&read_json(file)?).await,
        ApplyKind::Custom => service.apply_custom(&read_json(file)?).await,
        ApplyKind::Cache => Ok(vec![service.apply_cache(&read_json(file)?).await?]),
        ApplyKind::Ddos => Ok(vec![service.apply_ddos(&read_json(file)?).await?]),
        ApplyKind::DeleteSubdomain => service.delete_subdomains(&read_json(file)?).await,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn connect(config_path: &Path) -> EdgewardResult<CloudflareClient> {
    let config = FileConfig::load(config_path)?.cloudflare(|name| std::env::var(name).ok())?;
    info!(base_url = %config.base_url, "connecting");
    CloudflareClient::new(config)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> EdgewardResult<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| EdgewardError::InvalidPayload {
        reason: format!("failed to read '{}': {e}", path.display()),
    })?;
    serde_json::from_str(&contents).map_err(|e| EdgewardError::InvalidPayload {
        reason: format!("'{}' is not a valid payload: {e}", path.display()),
    })
}

fn to_json<T: Serialize>(value: &T) -> EdgewardResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| EdgewardError::InvalidPayload {
        reason: format!("failed to encode output: {e}"),
    })
}

fn print_json<T: Serialize>(value: &T) -> EdgewardResult<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

fn write_journal(journal: &InMemoryJournal, path: &Path) -> EdgewardResult<()> {
    let export = journal.export()?;
    std::fs::write(path, to_json(&export)?).map_err(|e| EdgewardError::JournalWriteFailed {
        reason: format!("failed to write '{}': {e}", path.display()),
    })?;
    info!(
        path = %path.display(),
        entries = export.entries.len(),
        mutations = export.mutation_count(),
        verified = journal.verify_integrity(),
        "journal written"
    );
    Ok(())
}
