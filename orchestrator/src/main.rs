//! Task and dialog orchestrator for a WorkFlowy backlog.
//!
//! Polls the configured backlog node, dispatches agent work, and writes
//! results and digests back into the outline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::agents::build_registry;
use orchestrator::engine::{EngineConfig, Orchestrator};
use orchestrator::exit_codes;
use orchestrator::io::config::{OrchestratorConfig, load_config};
use orchestrator::io::workflowy::WorkflowyClient;
use orchestrator::logging;
use tracing::error;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Task and dialog orchestrator for a WorkFlowy backlog"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, global = true, default_value = "orchestrator.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tick every poll interval until Ctrl-C.
    Run,
    /// Run a single tick, then print the digest.
    Once {
        /// Write the digest into the configured digest node instead of only printing it.
        #[arg(long)]
        write_digest: bool,
    },
    /// Load and validate the config, then print a summary.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let cfg = load_config(&cli.config)?;
    match cli.command {
        Command::CheckConfig => {
            print_summary(&cli.config, &cfg);
            Ok(exit_codes::OK)
        }
        Command::Run => {
            let orchestrator = build_orchestrator(&cfg)?;
            orchestrator.run_forever().await?;
            Ok(exit_codes::OK)
        }
        Command::Once { write_digest } => {
            let orchestrator = build_orchestrator(&cfg)?;
            if let Err(err) = orchestrator.tick().await {
                error!(err = %format!("{err:#}"), "tick failed");
                return Ok(exit_codes::TICK_FAILED);
            }
            let digest = if write_digest {
                match orchestrator.write_digest().await {
                    Ok(Some(digest)) => digest,
                    Ok(None) => orchestrator.generate_digest(),
                    Err(err) => {
                        error!(err = %format!("{err:#}"), "digest write failed");
                        return Ok(exit_codes::TICK_FAILED);
                    }
                }
            } else {
                orchestrator.generate_digest()
            };
            println!("{digest}");
            Ok(exit_codes::OK)
        }
    }
}

fn build_orchestrator(cfg: &OrchestratorConfig) -> Result<Orchestrator<WorkflowyClient>> {
    let api_key = std::env::var(&cfg.tree.api_key_env)
        .with_context(|| format!("environment variable {} is not set", cfg.tree.api_key_env))?;
    let client = WorkflowyClient::new(&cfg.tree.api_url, api_key, cfg.tree.request_timeout())?;
    let agents = build_registry(&cfg.agents)?;
    Orchestrator::new(EngineConfig::from(cfg), client, agents, cfg.autonomy.to_rules())
}

fn print_summary(path: &Path, cfg: &OrchestratorConfig) {
    println!("config: {}", path.display());
    println!("backlog node: {}", cfg.tree.backlog_node_id);
    println!(
        "digest node: {}",
        cfg.tree.digest_node_id.as_deref().unwrap_or("(none)")
    );
    println!(
        "poll interval: {}s, dialog depth: {}, stale after: {}h, concurrency: {}",
        cfg.poll_interval_secs, cfg.dialog_depth, cfg.stale_hours, cfg.max_concurrent_dispatches
    );
    let key_state = if std::env::var_os(&cfg.tree.api_key_env).is_some() {
        "set"
    } else {
        "missing"
    };
    println!("api key ({}): {key_state}", cfg.tree.api_key_env);
    println!(
        "autonomy rules: {}",
        cfg.autonomy.to_rules().rules().len()
    );
    if cfg.agents.is_empty() {
        println!("agents: (none; echo agent will be used as default)");
    }
    for agent in &cfg.agents {
        println!("agent {}: {}", agent.kind(), agent.names().join(", "));
    }
}
