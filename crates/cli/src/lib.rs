pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "loanbot",
    about = "LoanBot operator CLI",
    long_about = "Operate LoanBot migrations, config inspection, readiness checks, and offline intake runs.",
    after_help = "Examples:\n  loanbot doctor --json\n  loanbot config\n  loanbot intake --text \"I need $500 for car repair\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, extraction backend readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run an offline intake conversation against the rule-based extractor")]
    Intake {
        #[arg(long, help = "Opening applicant message fed into the first turn")]
        text: Option<String>,
        #[arg(long, default_value_t = 6, help = "Maximum number of turns before giving up")]
        max_turns: usize,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Intake { text, max_turns } => {
            commands::intake::run(text.as_deref(), max_turns)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
