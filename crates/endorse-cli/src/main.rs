mod admin;
mod history;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use endorse_core::SystemClock;
use endorse_db::PgHistoryRepository;
use endorse_history::{HistoryService, RetryPolicy};
use tracing_subscriber::EnvFilter;

use crate::admin::AdminCommands;
use crate::history::HistoryCommands;

#[derive(Debug, Parser)]
#[command(name = "endorse-cli")]
#[command(about = "Endorsement history command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect stored histories
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Manual corrections to stored histories
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("endorse-cli ready; run with --help to list commands");
        return Ok(());
    };

    let config = endorse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = endorse_db::PoolConfig::from_app_config(&config);
    let pool = endorse_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = endorse_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            endorse_db::ping(&pool).await?;
            println!("database reachable");
        }
        Commands::History { command } => {
            let service = build_service(pool, &config);
            history::run(&service, command).await?;
        }
        Commands::Admin { command } => {
            let service = build_service(pool, &config);
            admin::run(&service, command).await?;
        }
    }

    Ok(())
}

fn build_service(pool: sqlx::PgPool, config: &endorse_core::AppConfig) -> HistoryService {
    HistoryService::new(
        Arc::new(PgHistoryRepository::new(pool)),
        Arc::new(SystemClock),
        RetryPolicy::from_app_config(config),
    )
}

#[cfg(test)]
mod tests;
