//! recordnet-cli - Command-line interface for recordnet
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use recordnet_client::{ClientError, ClientSession, SessionConfig};
use recordnet_protocol::{Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recordnet-cli")]
#[command(about = "Command-line interface for the recordnet record server")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, env = "RECORDNET_SERVER", default_value = "127.0.0.1:7411")]
    server: SocketAddr,

    /// Username sent with every request
    #[arg(short, long, env = "RECORDNET_USER")]
    user: Option<String>,

    /// Password sent with every request
    #[arg(short, long, env = "RECORDNET_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// How long to wait for each response, in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Print structured response payloads as JSON
    #[arg(long)]
    payload: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Run a single command, e.g. `exec add {"name": "a", "value": 1}`
    Exec {
        /// Command words, parsed like a REPL line
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
}

/// Per-request settings shared by the REPL and `exec`.
pub struct Target {
    user: Option<String>,
    password: Option<String>,
    timeout: Duration,
    show_payload: bool,
}

impl Target {
    /// Attaches credentials and sends a request, waiting at most the
    /// configured timeout.
    pub fn send(&self, session: &ClientSession, request: Request) -> Result<Response, ClientError> {
        let request =
            commands::authenticate(request, self.user.as_deref(), self.password.as_deref());
        session.try_send_and_wait(request, self.timeout)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let timeout = Duration::from_millis(cli.timeout_ms);
    let config = SessionConfig::new(cli.server).with_request_timeout(timeout);
    let session = ClientSession::new(config)?;
    let target = Target {
        user: cli.user,
        password: cli.password,
        timeout,
        show_payload: cli.payload,
    };

    match cli.command {
        Some(Commands::Repl) | None => repl::run(session, target)?,
        Some(Commands::Exec { words }) => {
            // One round trip for the catalog so arguments are checked the
            // same way the REPL checks them.
            let mut catalog = match target.send(&session, Request::new(["help"])) {
                Ok(response) => response.catalog,
                Err(e) => {
                    eprintln!("{}: {}", "Connection failed".red(), e);
                    std::process::exit(1);
                }
            };

            let result = repl::execute_line(&session, &target, &words.join(" "), &mut catalog);
            session.close();
            match result {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
