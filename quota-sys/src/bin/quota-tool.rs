// SPDX-License-Identifier: GPL-3.0-only

//! CLI wrapper around quota-sys for testing and manual operations

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use quota_sys::{
    clear_project_id, detect_filesystem, get_project_id, set_project_id, EnumerationStrategy,
    QuotaConfig, QuotaError, QuotaKind, QuotaLimits, QuotaManager,
};
use serde_json::json;

/// Disk quota inspection and management for ext4 and XFS
#[derive(Parser)]
#[command(name = "quota-tool")]
#[command(about = "CLI tool for filesystem quota operations", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to $QUOTA_SYS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the quota family of the filesystem holding a path
    Detect { path: PathBuf },
    /// Set block (KiB) and inode limits for an identity
    Set {
        path: PathBuf,
        id: u32,
        block_hard: u64,
        block_soft: u64,
        inode_hard: u64,
        inode_soft: u64,
        #[arg(long, default_value_t = QuotaKind::Project)]
        kind: QuotaKind,
    },
    /// Show limits and usage of an identity
    Get {
        path: PathBuf,
        id: u32,
        #[arg(long, default_value_t = QuotaKind::Project)]
        kind: QuotaKind,
    },
    /// List every configured identity
    List {
        path: PathBuf,
        #[arg(long, default_value_t = QuotaKind::Project)]
        kind: QuotaKind,
        /// Highest identity to consider (inclusive)
        #[arg(long)]
        max_id: Option<u32>,
        /// Force one enumeration strategy instead of automatic selection
        #[arg(long)]
        strategy: Option<EnumerationStrategy>,
    },
    /// Clear every limit of an identity
    Remove {
        path: PathBuf,
        id: u32,
        #[arg(long, default_value_t = QuotaKind::Project)]
        kind: QuotaKind,
    },
    /// Exit non-zero unless the identity has a limit set
    TestId {
        path: PathBuf,
        id: u32,
        #[arg(long, default_value_t = QuotaKind::Project)]
        kind: QuotaKind,
    },
    /// Show the mount and device node a path resolves to
    Resolve { path: PathBuf },
    /// Assign a project id to a file or directory
    SetProject { path: PathBuf, id: u32 },
    /// Show the project id of a file or directory
    GetProject { path: PathBuf },
    /// Remove the project id of a file or directory
    ClearProject { path: PathBuf },
}

fn main() -> ExitCode {
    // Initialize tracing to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// The platform errno when there is one, 1 otherwise
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<QuotaError>()
        .and_then(QuotaError::errno)
        .map(|errno| (errno as i32).clamp(1, 255) as u8)
        .unwrap_or(1)
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => QuotaConfig::load(path)?,
        None => QuotaConfig::from_env()?,
    };
    let manager = QuotaManager::with_config(config);

    match cli.command {
        Commands::Detect { path } => {
            let family = detect_filesystem(&path)?;
            println!("{}", json!({ "path": path, "filesystem": family }));
        }
        Commands::Set {
            path,
            id,
            block_hard,
            block_soft,
            inode_hard,
            inode_soft,
            kind,
        } => {
            let limits = QuotaLimits::new(block_hard, block_soft, inode_hard, inode_soft);
            manager.set_quota(&path, id, kind, limits)?;
            println!("{{\"success\": true}}");
        }
        Commands::Get { path, id, kind } => {
            let record = manager.get_quota(&path, id, kind)?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Commands::List {
            path,
            kind,
            max_id,
            strategy,
        } => {
            let records = match strategy {
                Some(strategy) => manager.list_quotas_with(&path, kind, max_id, strategy),
                None => manager.list_quotas(&path, kind, max_id),
            };
            match records {
                Ok(records) => println!("{}", serde_json::to_string(&records)?),
                Err(e) => {
                    if !e.partial_records().is_empty() {
                        println!("{}", serde_json::to_string(e.partial_records())?);
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::Remove { path, id, kind } => {
            manager.remove_quota(&path, id, kind)?;
            println!("{{\"success\": true}}");
        }
        Commands::TestId { path, id, kind } => {
            let status = manager.test_quota(&path, id, kind)?;
            println!("{}", json!({ "id": id, "kind": kind, "status": status }));
            if !status.is_configured() {
                return Err(QuotaError::NotConfigured { kind, id }.into());
            }
        }
        Commands::Resolve { path } => {
            let binding = manager.resolve(&path)?;
            println!("{}", serde_json::to_string(&binding)?);
        }
        Commands::SetProject { path, id } => {
            set_project_id(&path, id)?;
            println!("{{\"success\": true}}");
        }
        Commands::GetProject { path } => {
            let id = get_project_id(&path)?;
            println!("{}", json!({ "path": path, "project_id": id }));
        }
        Commands::ClearProject { path } => {
            clear_project_id(&path)?;
            println!("{{\"success\": true}}");
        }
    }

    Ok(())
}
