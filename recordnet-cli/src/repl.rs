//! Interactive REPL.

use crate::commands;
use crate::Target;
use colored::Colorize;
use recordnet_client::ClientSession;
use recordnet_protocol::{CommandDescriptor, Request};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

pub fn run(session: ClientSession, target: Target) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "recordnet CLI".bold().cyan());
    println!("Connecting to {}...", session.config().addr);

    let mut catalog = Vec::new();
    match target.send(&session, Request::new(["help"])) {
        Ok(response) => {
            println!("{}", "Connected!".green());
            catalog = response.catalog;
        }
        Err(e) => println!(
            "{}: {} (commands will be sent unchecked until the server answers)",
            "Warning".yellow(),
            e
        ),
    }

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = home::home_dir()
        .map(|h| h.join(".recordnet_history"))
        .unwrap_or_else(|| ".recordnet_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands, 'quit' to exit.\n");

    loop {
        let prompt = format!("{} ", "recordnet>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "quit" | "exit" | "q") {
                    break;
                }
                match execute_line(&session, &target, line, &mut catalog) {
                    Ok(output) => println!("{}\n", output),
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    session.close();
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

/// Sends one line and returns the formatted output, refreshing `catalog`
/// from the response.
pub fn execute_line(
    session: &ClientSession,
    target: &Target,
    line: &str,
    catalog: &mut Vec<CommandDescriptor>,
) -> Result<String, Box<dyn std::error::Error>> {
    let request = commands::parse_line(line, catalog)?;
    let response = target.send(session, request)?;

    if !response.catalog.is_empty() && response.catalog != *catalog {
        tracing::debug!("Command catalog updated ({} commands)", response.catalog.len());
        *catalog = response.catalog.clone();
    }

    let mut output = commands::format_response(&response);
    if target.show_payload {
        if let Some(payload) = commands::format_payload(&response) {
            output.push('\n');
            output.push_str(&payload.dimmed().to_string());
        }
    }
    Ok(output)
}
