//! Spotify CLI - Lightweight Spotify Web API client
//!
//! OAuth2 authorization-code flow with PKCE, plus a thin authenticated
//! wrapper over the Web API.

mod api;
mod auth;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser)]
#[command(name = "spotify-cli")]
#[command(about = "Lightweight CLI client for the Spotify Web API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Spotify
    Login {
        /// Force a full re-authorization even if cached tokens exist
        #[arg(short, long)]
        force: bool,

        /// Seconds to wait for the browser redirect before giving up
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show current user info (verify auth works)
    Whoami,

    /// Show current playback state
    Playback,

    /// Issue a raw authenticated request against the Web API
    Api {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,

        /// API path, e.g. /me/playlists
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query")]
        query: Vec<String>,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load()?;

    match cli.command {
        Commands::Login { force, timeout } => {
            tracing::info!("Starting authentication flow...");
            auth::login(&config, force, timeout).await?;
        }
        Commands::Logout => {
            auth::logout(&config)?;
        }
        Commands::Status => {
            auth::status(&config)?;
        }
        Commands::Whoami => {
            api::whoami(&config).await?;
        }
        Commands::Playback => {
            api::playback(&config).await?;
        }
        Commands::Api {
            method,
            path,
            query,
            body,
        } => {
            api::call_raw(&config, &method, &path, &query, body.as_deref()).await?;
        }
    }

    Ok(())
}
