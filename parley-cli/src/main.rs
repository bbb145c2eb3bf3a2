//! CLI entry point for parley

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use parley_agent::{Orchestrator, SweepService};
use parley_core::archive::FileArchiveSink;
use parley_core::config::{Config, ConfigLoader};
use parley_core::logging::{init_logging, WorkerGuard};
use parley_core::utils::truncate;
use parley_core::SystemClock;
use parley_providers::{HttpRetriever, OllamaGenerator, Retriever};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Session-aware chat over your documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Chat with the assistant
    Chat {
        /// Ask a single question and exit
        #[arg(short, long)]
        message: Option<String>,
    },
    /// List archived sessions
    Archives,
    /// Print an archived session
    Show {
        /// Session id
        session_id: String,
    },
}

/// A line typed at the chat prompt
#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Query(&'a str),
    End,
    New,
    Sessions,
    Quit,
    Unknown(&'a str),
    Empty,
}

fn parse_repl_input(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    match line {
        "" => ReplInput::Empty,
        "/end" => ReplInput::End,
        "/new" => ReplInput::New,
        "/sessions" => ReplInput::Sessions,
        "/quit" | "/exit" => ReplInput::Quit,
        cmd if cmd.starts_with('/') => ReplInput::Unknown(cmd),
        query => ReplInput::Query(query),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Init => run_init(&loader)?,
        Commands::Chat { message } => {
            let (config, _guard) = load_config(&loader)?;
            info!("Starting chat");
            run_chat(&config, message).await?;
        }
        Commands::Archives => {
            let (config, _guard) = load_config(&loader)?;
            run_archives(&config).await?;
        }
        Commands::Show { session_id } => {
            let (config, _guard) = load_config(&loader)?;
            run_show(&config, &session_id).await?;
        }
    }

    Ok(())
}

/// Load configuration and start logging; keep the guard alive while logging
fn load_config(loader: &ConfigLoader) -> Result<(Config, WorkerGuard)> {
    let config = loader.load()?;
    let guard = init_logging(&config.logging);
    Ok((config, guard))
}

fn run_init(loader: &ConfigLoader) -> Result<()> {
    let config_path = loader.config_dir().join("config.json");
    if config_path.exists() {
        println!(
            "{} Configuration already exists at {}",
            style("!").yellow(),
            config_path.display()
        );
        return Ok(());
    }

    loader.save(&Config::default())?;
    println!(
        "{} Wrote default configuration to {}",
        style("✓").green().bold(),
        config_path.display()
    );
    println!(
        "  Set {} to enable document retrieval.",
        style("retrieval.endpoint").cyan()
    );
    Ok(())
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let sink = Arc::new(FileArchiveSink::new(config.archive.destination_path()));
    let retriever: Option<Arc<dyn Retriever>> = if config.retrieval.is_enabled() {
        Some(Arc::new(HttpRetriever::new(&config.retrieval)?))
    } else {
        info!("No retrieval endpoint configured; answers use conversation history only");
        None
    };
    let generator = Arc::new(OllamaGenerator::new(&config.generation)?);

    Ok(Orchestrator::from_config(
        config,
        Arc::new(SystemClock),
        sink,
        retriever,
        generator,
    ))
}

async fn run_chat(config: &Config, message: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    if let Some(message) = message {
        println!("{}", style("Thinking...").cyan());
        let response = match orchestrator.query(None, &message).await {
            Ok(response) => response,
            Err(e) => {
                error!("Query failed: {}", e);
                println!("{}", style(e.user_message()).red());
                return Err(e.into());
            }
        };
        println!("\n{}", style("Response:").bold());
        println!("{}", response.response);
        orchestrator.end_session(&response.session_id).await?;
        return Ok(());
    }

    let sweeper = SweepService::new(
        Arc::clone(orchestrator.lifecycle()),
        config.sessions.sweep.clone(),
    );
    sweeper.start().await;

    println!(
        "{}",
        style("parley chat (/end, /new, /sessions, /quit)").bold().cyan()
    );

    let mut session_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", style("you>").green().bold());
        std::io::Write::flush(&mut std::io::stdout())?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_repl_input(&line) {
            ReplInput::Empty => {}
            ReplInput::Quit => break,
            ReplInput::Unknown(cmd) => {
                println!("{} Unknown command {}", style("✗").red(), cmd);
            }
            ReplInput::Sessions => {
                let sessions = orchestrator.list_sessions().await?;
                if sessions.is_empty() {
                    println!("No active sessions");
                }
                for s in sessions {
                    println!(
                        "  {} ({} turns, last active {})",
                        style(&s.session_id).bold(),
                        s.turn_count,
                        s.last_active_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            input @ (ReplInput::End | ReplInput::New) => {
                if let Some(id) = session_id.take() {
                    end_and_report(&orchestrator, &id).await;
                }
                if input == ReplInput::New {
                    println!("{}", style("Started a fresh conversation").dim());
                }
            }
            ReplInput::Query(text) => {
                match orchestrator.query(session_id.as_deref(), text).await {
                    Ok(response) => {
                        if response.new_session {
                            println!(
                                "{}",
                                style(format!("session {}", response.session_id)).dim()
                            );
                        }
                        let grounding = if response.sources_count > 0 {
                            format!(" ({} sources)", response.sources_count)
                        } else {
                            String::new()
                        };
                        println!(
                            "{}{} {}",
                            style("parley").cyan().bold(),
                            style(grounding).dim(),
                            response.response
                        );
                        session_id = Some(response.session_id);
                    }
                    Err(e) => {
                        error!("Query failed: {}", e);
                        println!("{}", style(e.user_message()).red());
                    }
                }
            }
        }
    }

    if let Some(id) = session_id.take() {
        end_and_report(&orchestrator, &id).await;
    }
    sweeper.stop().await;
    Ok(())
}

async fn end_and_report(orchestrator: &Orchestrator, session_id: &str) {
    match orchestrator.end_session(session_id).await {
        Ok(end) if end.archived => {
            println!("{} Session {} archived", style("✓").green().bold(), session_id);
        }
        Ok(_) => {}
        Err(e) => {
            error!("Ending session {} failed: {}", session_id, e);
            println!("{}", style(e.user_message()).red());
        }
    }
}

async fn run_archives(config: &Config) -> Result<()> {
    let sink = FileArchiveSink::new(config.archive.destination_path());
    let archives = parley_core::archive::ArchiveSink::list(&sink).await?;

    println!("{}", style("Archived Sessions").bold().cyan());
    if archives.is_empty() {
        println!("  No archived sessions in {}", sink.dir().display());
        return Ok(());
    }

    for summary in archives {
        println!(
            "  {}  {}  {} turns  {}",
            style(&summary.session_id).bold(),
            summary.archived_at.format("%Y-%m-%d %H:%M:%S"),
            summary.turn_count,
            style(summary.terminated_reason).dim()
        );
    }
    Ok(())
}

async fn run_show(config: &Config, session_id: &str) -> Result<()> {
    let sink = FileArchiveSink::new(config.archive.destination_path());
    let Some(record) = parley_core::archive::ArchiveSink::read(&sink, session_id).await? else {
        anyhow::bail!("No archived session {}", session_id);
    };

    println!("{}", style(format!("Session {}", record.session_id())).bold().cyan());
    println!(
        "  created {}  archived {}  ({})",
        record.session.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.archived_at.format("%Y-%m-%d %H:%M:%S"),
        record.terminated_reason
    );
    for (key, value) in &record.session.metadata {
        println!("  {}: {}", key, truncate(&value.to_string(), 80));
    }
    println!();
    println!("{}", record.transcript());
    Ok(())
}
