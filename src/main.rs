//! Newsbrief: Bitcoin news digest runtime.
//!
//! Usage:
//!   newsbrief init                  Write a default config file
//!   newsbrief serve [--port N]      Run the tool provider server
//!   newsbrief run                   Run the pipeline once
//!   newsbrief daemon [--with-server]  Run the pipeline on its cron schedule
//!   newsbrief status                Show recent runs
//!   newsbrief tools                 List the tools advertised to the model
//!   newsbrief call <name> [--args]  Invoke one tool through the registry

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use newsbrief::config::{self, NewsbriefConfig};
use newsbrief::llm::ChatClient;
use newsbrief::pipeline::{OutboxMailer, PipelineDriver};
use newsbrief::providers;
use newsbrief::scheduler::PipelineScheduler;
use newsbrief::server::{self, AppState};
use newsbrief::state::Database;
use newsbrief::tools::{self, ToolRegistry};
use newsbrief::types::*;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "newsbrief")]
#[command(version)]
#[command(about = "Scheduled Bitcoin news digests summarized by a tool-calling model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file.
    #[arg(long, default_value = "~/.newsbrief/newsbrief.toml")]
    config: String,

    /// Log level (debug, info, warn, error). Overrides the config file;
    /// RUST_LOG takes precedence over both.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Run the tool provider server.
    Serve {
        /// Port to listen on (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the pipeline once.
    Run,

    /// Run the pipeline on its cron schedule.
    Daemon {
        /// Also run the tool provider server in this process.
        #[arg(long)]
        with_server: bool,
    },

    /// Show recent pipeline runs.
    Status {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List the tools advertised to the model.
    Tools,

    /// Invoke one tool through the registry.
    Call {
        name: String,

        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = PathBuf::from(shellexpand::tilde(&cli.config).into_owned());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(config::log_level(cli.log_level.as_deref(), &config_path))
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Serve { port } => cmd_serve(&config_path, port).await,
        Commands::Run => cmd_run(&config_path).await,
        Commands::Daemon { with_server } => cmd_daemon(&config_path, with_server).await,
        Commands::Status { limit } => cmd_status(&config_path, limit),
        Commands::Tools => cmd_tools(&config_path),
        Commands::Call { name, args } => cmd_call(&config_path, &name, &args).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            "!!!".yellow().bold(),
            config_path.display()
        );
        return Ok(());
    }
    config::save_config(&NewsbriefConfig::default(), config_path)?;
    println!(
        "{} Wrote default config to {}",
        ">>>".green().bold(),
        config_path.display()
    );
    println!("    Credentials can also come from the environment or a .env file.");
    Ok(())
}

async fn cmd_serve(config_path: &Path, port: Option<u16>) -> Result<()> {
    let mut config = config::load_runtime_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let (news, weather) = providers::sources_from_config(&config)?;
    let registry = Arc::new(tools::local_registry(news.clone(), weather.clone()));
    let state = AppState::new(news, weather, registry);

    let cancel = shutdown_token();
    server::serve(&config.bind_addr(), state, cancel).await
}

async fn cmd_run(config_path: &Path) -> Result<()> {
    let config = config::load_runtime_config(config_path)?;
    let driver = build_driver(&config)?;

    match driver.run().await {
        Ok(outcome) => {
            println!(
                "{} Run {} delivered '{}' ({} headlines, ref {})",
                ">>>".green().bold(),
                outcome.run_id,
                outcome.email.subject,
                outcome.headline_count,
                outcome.delivery
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Run failed:".red().bold(), e);
            Err(e.into())
        }
    }
}

async fn cmd_daemon(config_path: &Path, with_server: bool) -> Result<()> {
    let config = config::load_runtime_config(config_path)?;
    let driver = Arc::new(build_driver(&config)?);
    let scheduler = PipelineScheduler::new(driver, &config.schedule)?;
    let cancel = shutdown_token();

    let server_handle = if with_server {
        let (news, weather) = providers::sources_from_config(&config)?;
        let registry = Arc::new(tools::local_registry(news.clone(), weather.clone()));
        let state = AppState::new(news, weather, registry);
        let bind = config.bind_addr();
        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server::serve(&bind, state, server_cancel).await {
                error!("Tool server stopped: {e:#}");
            }
        }))
    } else {
        None
    };

    println!(
        "{} Daemon started (schedule: '{}', model: {})",
        ">>>".green().bold(),
        config.schedule.cron,
        config.llm.model
    );
    scheduler.run(cancel.clone()).await?;

    cancel.cancel();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }
    info!("Daemon stopped");
    Ok(())
}

fn cmd_status(config_path: &Path, limit: usize) -> Result<()> {
    let config = config::load_runtime_config(config_path)?;
    let db = open_database(&config)?;
    let runs = db.recent_runs(limit)?;
    let last_success = db.kv_get("last_success")?.unwrap_or_else(|| "never".into());

    println!();
    println!("{}", "=== Newsbrief Status ===".bold());
    println!();
    println!("  {}:   {}", "Model".bold(), config.llm.model);
    println!("  {}:  {}", "Schedule".bold(), config.schedule.cron);
    println!("  {}:  {:?}", "Tool mode".bold(), config.tools.mode);
    println!("  {}: {}", "Last success".bold(), last_success);
    println!();

    if runs.is_empty() {
        println!("  No runs recorded yet.");
    }
    for run in runs {
        println!(
            "  {}  {}  {:<10} {}",
            run.id,
            colorize_status(run.status),
            run.stage,
            run.started_at
        );
        if let Some(err) = run.error {
            println!("      {}", err.dimmed());
        }
    }
    println!();
    Ok(())
}

fn cmd_tools(config_path: &Path) -> Result<()> {
    let config = config::load_runtime_config(config_path)?;
    let registry = build_registry(&config)?;
    for descriptor in registry.list() {
        println!("{} {}", descriptor.name.bold(), descriptor.description);
        println!(
            "    {}",
            serde_json::to_string(&descriptor.json_schema()).unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_call(config_path: &Path, name: &str, args: &str) -> Result<()> {
    let config = config::load_runtime_config(config_path)?;
    let registry = build_registry(&config)?;

    let call = ToolCallRequest::new(name, RawArguments::Encoded(args.to_string()));
    let result = registry.dispatch(&call).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(message) = result.error_message() {
        anyhow::bail!("tool '{name}' failed: {message}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_registry(config: &NewsbriefConfig) -> Result<ToolRegistry> {
    let (news, weather) = providers::sources_from_config(config)?;
    tools::build_registry(config, news, weather)
}

fn build_driver(config: &NewsbriefConfig) -> Result<PipelineDriver> {
    let registry = Arc::new(build_registry(config)?);
    let model = ChatClient::from_config(&config.llm, config.request_timeout())
        .context("Failed to set up the model client")?;
    let mailer = OutboxMailer::new(config.resolved_outbox_dir());
    let db = Arc::new(Mutex::new(open_database(config)?));

    Ok(PipelineDriver::new(
        registry,
        Arc::new(model),
        Arc::new(mailer),
        db,
        config.pipeline.clone(),
    ))
}

fn open_database(config: &NewsbriefConfig) -> Result<Database> {
    let db_path = config.resolved_db_path();
    Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {db_path}"))
}

/// Token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            trigger.cancel();
        }
    });
    cancel
}

fn colorize_status(status: RunStatus) -> colored::ColoredString {
    let label = format!("{:<9}", status.to_string());
    match status {
        RunStatus::Running => label.yellow(),
        RunStatus::Succeeded => label.green(),
        RunStatus::Failed => label.red(),
    }
}
