//! Task relay function binary.
//!
//! `relay runtime` is the deployed entry point; `relay invoke` runs a single
//! event locally and prints the envelope.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use relay::exit_codes;
use relay::handler::{EventHandler, build_handler};
use relay::io::config::{load_from_env, render_config};
use relay::io::runtime_api::RuntimeClient;
use relay::logging;
use relay::runtime::run_loop;

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Relay natural-language tasks to a command-line assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one event and print the envelope as JSON.
    Invoke {
        /// Read the event JSON from this file (`-` for stdin).
        #[arg(long, conflicts_with_all = ["task", "execute"])]
        event: Option<PathBuf>,
        /// Task text (builds `{"task": ..., "execute": ...}`).
        #[arg(long)]
        task: Option<String>,
        /// Execute generated scripts.
        #[arg(long)]
        execute: bool,
    },
    /// Serve events from the platform Runtime API (`AWS_LAMBDA_RUNTIME_API`).
    Runtime,
    /// Print the effective configuration as TOML.
    Config,
}

fn main() {
    logging::init("info");
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Invoke {
            event,
            task,
            execute,
        } => cmd_invoke(event, task, execute),
        Command::Runtime => cmd_runtime(),
        Command::Config => cmd_config(),
    }
}

fn cmd_invoke(event: Option<PathBuf>, task: Option<String>, execute: bool) -> Result<i32> {
    let event = match event {
        Some(path) => read_event(&path)?,
        None => build_event(task, execute),
    };
    let handler = build_handler(load_from_env()?);
    let envelope = handler.handle(&event);
    println!(
        "{}",
        serde_json::to_string_pretty(&envelope).context("serialize envelope")?
    );
    Ok(exit_codes::for_status(envelope.status_code))
}

fn cmd_runtime() -> Result<i32> {
    let client = RuntimeClient::from_env()?;
    let config = match load_from_env() {
        Ok(config) => config,
        Err(err) => {
            let message = format!("{err:#}");
            client.post_init_error("InvalidConfig", &message)?;
            return Err(err);
        }
    };
    let handler = build_handler(config);
    run_loop(&client, &handler)?;
    Ok(exit_codes::OK)
}

fn cmd_config() -> Result<i32> {
    let config = load_from_env()?;
    print!("{}", render_config(&config)?);
    Ok(exit_codes::OK)
}

fn read_event(path: &Path) -> Result<Value> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read event from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parse event json")
}

/// An event from flags. A missing task is left out so the handler reports it.
fn build_event(task: Option<String>, execute: bool) -> Value {
    match task {
        Some(task) => json!({ "task": task, "execute": execute }),
        None => json!({ "execute": execute }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_invoke_flags() {
        let cli = Cli::parse_from(["relay", "invoke", "--task", "hello world", "--execute"]);
        match cli.command {
            Command::Invoke {
                event,
                task,
                execute,
            } => {
                assert!(event.is_none());
                assert_eq!(task.as_deref(), Some("hello world"));
                assert!(execute);
            }
            _ => panic!("expected invoke"),
        }
    }

    #[test]
    fn event_file_conflicts_with_task_flags() {
        let result = Cli::try_parse_from(["relay", "invoke", "--event", "e.json", "--task", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_runtime() {
        let cli = Cli::parse_from(["relay", "runtime"]);
        assert!(matches!(cli.command, Command::Runtime));
    }

    #[test]
    fn build_event_omits_missing_task() {
        assert_eq!(build_event(None, true), json!({"execute": true}));
        assert_eq!(
            build_event(Some("t".to_string()), false),
            json!({"task": "t", "execute": false})
        );
    }
}
