mod config;
mod references_cmd;
mod result_cmd;
mod run_cmd;
mod serve_cmd;
mod status_cmd;
mod wiring;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use lectio_core::request::NewGenerationRequest;
use lectio_db::pool;

use config::LectioConfig;

#[derive(Parser)]
#[command(name = "lectio", about = "Multi-day Bible study generation pipeline")]
struct Cli {
    /// Database URL (overrides LECTIO_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a lectio config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/lectio")]
        db_url: String,
        /// Model used for planning, writing and review
        #[arg(long)]
        model: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the lectio database (requires config file or env vars)
    DbInit,
    /// Generate a study in the foreground (Ctrl+C cancels)
    Run {
        #[arg(long)]
        title: String,
        /// What the study should cover, in plain language
        #[arg(long)]
        brief: String,
        #[arg(long, default_value_t = 7)]
        days: i32,
        /// devotional, academic, practical or inductive
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        difficulty: Option<String>,
        #[arg(long)]
        audience: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long, default_value = "cli")]
        owner: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show run status and phase history (omit run_id to list all runs)
    Status {
        run_id: Option<String>,
    },
    /// Cancel a pending or running run
    Cancel {
        run_id: String,
    },
    /// Print the result of a completed run
    Result {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Reference cache maintenance
    References {
        #[command(subcommand)]
        command: ReferencesCommands,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum ReferencesCommands {
    /// Delete expired reference validations
    Purge,
}

fn parse_run_id(s: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid run ID: {s}"))
}

/// Write the config file.
fn cmd_init(db_url: &str, model: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        llm: config::LlmSection {
            model: model.clone(),
            ..Default::default()
        },
        ..Default::default()
    };

    config::save_config_to(&cfg, &path)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(model) = model {
        println!("  llm.model = {model}");
    }
    println!();
    println!("Next: run `lectio db-init` to create and migrate the database.");

    Ok(())
}

async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = LectioConfig::resolve(cli_db_url)?;

    println!("Initializing lectio database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("lectio db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, model, force } => cmd_init(&db_url, model, force),
        Commands::DbInit => cmd_db_init(cli.database_url.as_deref()).await,
        command => run_with_database(cli.database_url.as_deref(), command).await,
    }
}

/// Commands that need a connected pool.
async fn run_with_database(cli_db_url: Option<&str>, command: Commands) -> anyhow::Result<()> {
    let resolved = LectioConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config)
        .await
        .context("failed to connect to database (run `lectio db-init` first)")?;

    let result = match command {
        Commands::References {
            command: ReferencesCommands::Purge,
        } => references_cmd::run_purge(&db_pool).await,
        command => match wiring::build_service(&resolved, &db_pool, access_for(&command)) {
            Ok(service) => dispatch(&service, command).await,
            Err(e) => Err(e),
        },
    };

    db_pool.close().await;
    result
}

/// Only commands that start generation need credentials up front.
fn access_for(command: &Commands) -> wiring::Access {
    match command {
        Commands::Run { .. } | Commands::Serve { .. } => wiring::Access::Generate,
        _ => wiring::Access::Inspect,
    }
}

async fn dispatch(service: &lectio_core::RunService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            title,
            brief,
            days,
            style,
            difficulty,
            audience,
            instructions,
            owner,
            json,
        } => {
            let request = NewGenerationRequest {
                owner_id: owner,
                title,
                brief,
                duration_days: days,
                style,
                difficulty,
                audience,
                special_instructions: instructions,
            };
            run_cmd::run_generate(service, request, json).await
        }
        Commands::Status { run_id } => {
            let run_id = run_id.as_deref().map(parse_run_id).transpose()?;
            status_cmd::run_status(service, run_id).await
        }
        Commands::Cancel { run_id } => {
            let run_id = parse_run_id(&run_id)?;
            service.cancel_run(run_id).await?;
            println!("Run {run_id} cancelled.");
            Ok(())
        }
        Commands::Result { run_id, json } => {
            let run_id = parse_run_id(&run_id)?;
            result_cmd::run_result(service, run_id, json).await
        }
        Commands::Serve { bind, port } => serve_cmd::run_serve(service.clone(), &bind, port).await,
        Commands::Init { .. } | Commands::DbInit | Commands::References { .. } => {
            unreachable!("handled before the service is built")
        }
    }
}
