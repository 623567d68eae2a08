mod config;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::PgPool;

use wayfarer_core::generator::PlanGenerator;
use wayfarer_core::model::GeminiClient;
use wayfarer_core::weather::WeatherClient;
use wayfarer_db::pool;
use wayfarer_db::queries::plans;

use config::WayfarerConfig;

#[derive(Parser)]
#[command(name = "wayfarer", about = "AI-assisted travel plan generator backend")]
struct Cli {
    /// Database URL (overrides WAYFARER_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a wayfarer config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/wayfarer")]
        db_url: String,
        /// Gemini API key to store in the config file
        #[arg(long)]
        api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the wayfarer database and run migrations
    DbInit,
    /// Run the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Delete plans older than a cutoff, along with their edit history
    Cleanup {
        /// Age cutoff in days
        #[arg(long, default_value_t = 365)]
        days: i64,
        /// Report how many plans would be deleted without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Execute the `wayfarer init` command: write config file.
fn cmd_init(db_url: &str, api_key: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let have_key = api_key.is_some();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        model: config::ModelSection {
            api_key,
            ..Default::default()
        },
        logs: None,
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if have_key {
        println!("  model.api_key = <set>");
    } else {
        println!("  model.api_key is unset; `wayfarer serve` will need GEMINI_API_KEY.");
    }
    println!();
    println!("Next: run `wayfarer db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `wayfarer db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = WayfarerConfig::resolve(cli_db_url)?;

    println!("Initializing wayfarer database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("wayfarer db-init complete.");
    Ok(())
}

/// Execute the `wayfarer serve` command: build state and run the HTTP server.
async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> anyhow::Result<()> {
    let resolved = WayfarerConfig::resolve(cli_db_url)?;
    let api_key = resolved.model.require_api_key()?;

    let mut model = GeminiClient::new(api_key)?;
    if let Some(url) = &resolved.model.base_url {
        model = model.with_base_url(url.clone());
    }
    if let Some(name) = &resolved.model.model {
        model = model.with_model(name.clone());
    }
    if let Some(secs) = resolved.model.timeout_secs {
        model = model.with_timeout(Duration::from_secs(secs));
    }
    tracing::info!(model = model.model(), "model client configured");

    let mut generator = PlanGenerator::new(Arc::new(model));
    if let Some(dir) = &resolved.log_dir {
        tracing::info!(dir = %dir.display(), "model call logging enabled");
        generator = generator.with_log_dir(dir.clone());
    }

    let weather = WeatherClient::new()?;

    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let state = routes::AppState {
        pool: db_pool.clone(),
        generator: Arc::new(generator),
        weather: Arc::new(weather),
    };

    let result = routes::run_serve(state, bind, port).await;
    db_pool.close().await;
    result
}

async fn run_cleanup(db_pool: &PgPool, days: i64, dry_run: bool) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(days);

    if dry_run {
        let count = plans::count_plans_older_than(db_pool, cutoff).await?;
        println!("{count} plans older than {days} days would be deleted.");
    } else {
        let deleted = plans::delete_plans_older_than(db_pool, cutoff).await?;
        println!("Deleted {deleted} plans older than {days} days, along with their edit history.");
    }
    Ok(())
}

/// Execute the `wayfarer cleanup` command: prune plans past the age cutoff.
async fn cmd_cleanup(cli_db_url: Option<&str>, days: i64, dry_run: bool) -> anyhow::Result<()> {
    let resolved = WayfarerConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    let result = run_cleanup(&db_pool, days, dry_run).await;
    db_pool.close().await;
    result
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
        Commands::Init {
            db_url,
            api_key,
            force,
        } => {
            cmd_init(&db_url, api_key, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
        Commands::Cleanup { days, dry_run } => {
            cmd_cleanup(cli.database_url.as_deref(), days, dry_run).await?;
        }
    }

    Ok(())
}
