//! habitica - command line client for the Habitica task API.
//!
//! Endpoints are not hard-coded: every command walks the tree built from
//! the service's own api documentation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{apidoc, call, status, tasks, Session};
use config::Config;

#[derive(Parser)]
#[command(name = "habitica")]
#[command(author, version, about = "Habitica from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of the default
    #[arg(short, long, global = true, env = "HABITIPY_CONFIG", value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// More output, repeat for more
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Less output, repeat for less
    #[arg(short, long, global = true, action = ArgAction::Count)]
    quiet: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show HP, XP, GP and more
    Status,

    /// Check server availability
    Server,

    /// Print the address of the task page
    Home,

    /// List, up and down habits
    Habits {
        #[command(subcommand)]
        action: Option<tasks::HabitsCommand>,
    },

    /// List, check and uncheck dailies
    Dailies {
        #[command(subcommand)]
        action: Option<tasks::DailiesCommand>,
    },

    /// List, complete, add or delete todos
    Todos {
        #[command(subcommand)]
        action: Option<tasks::TodosCommand>,
    },

    /// Call any documented endpoint
    Call(call::CallArgs),

    /// Inspect the api documentation
    #[command(subcommand)]
    Apidoc(apidoc::ApidocCommand),
}

fn log_level(verbose: u8, quiet: u8) -> &'static str {
    match (verbose, quiet) {
        (0, 0) => "info",
        (1, _) => "debug",
        (v, _) if v > 1 => "trace",
        (_, 1) => "warn",
        _ => "error",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = log_level(cli.verbose, cli.quiet);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("habitica={level},habit_core={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let path = match cli.config {
        Some(path) => path,
        None => config::default_path()?,
    };
    let config = Config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    match cli.command {
        Commands::Home => {
            println!("{}", status::home_url(&config));
            Ok(())
        }
        Commands::Apidoc(cmd) => apidoc::run(&config, cmd),
        Commands::Status => status::status(&Session::open(config)?),
        Commands::Server => status::server(&Session::open(config)?),
        Commands::Habits { action } => tasks::habits(&Session::open(config)?, action),
        Commands::Dailies { action } => tasks::dailies(&Session::open(config)?, action),
        Commands::Todos { action } => tasks::todos(&Session::open(config)?, action),
        Commands::Call(args) => call::run(&Session::open(config)?, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0, 0), "info");
        assert_eq!(log_level(1, 0), "debug");
        assert_eq!(log_level(3, 0), "trace");
        assert_eq!(log_level(0, 1), "warn");
        assert_eq!(log_level(0, 2), "error");
    }

    #[test]
    fn task_commands_parse() {
        let cli = Cli::try_parse_from(["habitica", "todos", "done", "1,3-5", "shoes", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Todos {
                action: Some(tasks::TodosCommand::Done(t)),
            } => {
                assert_eq!(t.ids, vec!["1,3-5", "shoes"]);
                assert!(t.dry_run);
            }
            _ => panic!("wrong command"),
        }

        let cli = Cli::try_parse_from(["habitica", "-vv", "habits"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Habits { action: None }));
    }

    #[test]
    fn call_parses_method_query_and_data() {
        let cli = Cli::try_parse_from([
            "habitica", "call", "POST", "tasks", "user", "--query", "a=b", "--data", "{}",
        ])
        .unwrap();
        let Commands::Call(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.method, habit_core::HttpMethod::Post);
        assert_eq!(args.segments, vec!["tasks", "user"]);
        assert_eq!(args.query, vec![("a".to_string(), "b".to_string())]);
        assert!(Cli::try_parse_from(["habitica", "call", "fetch", "tasks"]).is_err());
    }
}
