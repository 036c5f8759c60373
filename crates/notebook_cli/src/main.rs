//! Notebook CLI
//!
//! Command-line tools for the notebook sync stack.
//!
//! # Commands
//!
//! - `serve` - Run the reference sync server
//! - `session` - Import or fetch a session and list valid cookies
//! - `sync` - Run a sync cycle for a local store file
//! - `status` - Show cursor, schema version and pending changes
//! - `put` / `delete` - Edit records in a local store file

mod commands;

use clap::{Parser, Subcommand};
use commands::session::SessionSource;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline-first notebook sync tools.
#[derive(Parser)]
#[command(name = "notebook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Secret for signing sessions; sync endpoints are open without it
        #[arg(short, long, env = "NOTEBOOK_SECRET")]
        secret: Option<String>,

        /// Maximum records accepted per push
        #[arg(long, default_value = "1000")]
        max_push_records: usize,

        /// Session lifetime in hours
        #[arg(long, default_value = "24")]
        session_ttl_hours: u64,
    },

    /// Import or fetch a session, then list the valid cookies
    Session {
        /// Secure storage directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Import a JSON cookie blob from this file
        #[arg(short, long, conflicts_with = "login")]
        import: Option<PathBuf>,

        /// Sign in to the server as this user
        #[arg(short, long, requires = "server")]
        login: Option<String>,

        /// Server base URL for --login
        #[arg(long)]
        server: Option<String>,
    },

    /// Run a sync cycle
    Sync {
        /// Server base URL
        #[arg(long)]
        server: String,

        /// Local store file
        #[arg(long)]
        store: PathBuf,

        /// Secure storage directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Maximum cycles to run on retryable failures
        #[arg(short, long, default_value = "1")]
        retries: u32,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Show local sync status
    Status {
        /// Local store file
        #[arg(long)]
        store: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create or update a record
    Put {
        /// Local store file
        #[arg(long)]
        store: PathBuf,

        /// Table name
        #[arg(short, long)]
        table: String,

        /// Record id (generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Fields as key=value
        fields: Vec<String>,
    },

    /// Delete a record
    Delete {
        /// Local store file
        #[arg(long)]
        store: PathBuf,

        /// Table name
        #[arg(short, long)]
        table: String,

        /// Record id
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info,tower_http=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            addr,
            secret,
            max_push_records,
            session_ttl_hours,
        } => {
            commands::serve::run(addr, secret, max_push_records, session_ttl_hours).await?;
        }
        Commands::Session {
            dir,
            import,
            login,
            server,
        } => {
            let source = match (import, login, server) {
                (Some(file), _, _) => Some(SessionSource::Import(file)),
                (None, Some(user), Some(server)) => Some(SessionSource::Login { server, user }),
                _ => None,
            };
            commands::session::run(&dir, source).await?;
        }
        Commands::Sync {
            server,
            store,
            dir,
            retries,
            timeout,
        } => {
            commands::sync::run(&server, &store, &dir, retries, timeout).await?;
        }
        Commands::Status { store, format } => {
            commands::status::run(&store, &format)?;
        }
        Commands::Put {
            store,
            table,
            id,
            fields,
        } => {
            let id = commands::edit::put(&store, &table, id, &fields)?;
            println!("{id}");
        }
        Commands::Delete { store, table, id } => {
            commands::edit::delete(&store, &table, &id)?;
        }
    }

    Ok(())
}
