use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ferrum::cli::{Cli, Commands};
use ferrum::commands;
use ferrum::config::Config;
use ferrum::db;
use ferrum::engine::SessionEngine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        // Config commands never touch the database.
        Commands::Config(cmd) => commands::config::handle(cmd),

        cmd => {
            let cfg = Config::load(&Config::path()?)?;
            let user = cli
                .user
                .or_else(|| cfg.get("user").cloned())
                .unwrap_or_else(|| "default".to_string());
            let db_path = cfg.get("db-path").cloned().unwrap_or_else(|| "./ferrum.db".to_string());

            let pool = db::open(&db_path).await?;
            let engine = SessionEngine::new(pool);

            match cmd {
                Commands::Session(cmd) => commands::session::handle(cmd, &engine, &user).await,
                Commands::Template(cmd) => commands::template::handle(cmd, &engine).await,
                Commands::Config(_) => unreachable!(),
            }
        }
    }
}
