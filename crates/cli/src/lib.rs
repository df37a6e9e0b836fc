pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "listing",
    about = "Listing intake operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and rehearse seller conversations offline.",
    after_help = "Examples:\n  listing doctor --json\n  listing config\n  listing simulate --name Ana --phone 3001112233 -m \"es una casa de 120 m2\""
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
    #[command(about = "Validate config, integration readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Run a scripted conversation against in-memory storage and print the transcript"
    )]
    Simulate {
        #[arg(long, default_value = "Vendedor de prueba")]
        name: String,
        #[arg(long, default_value = "573000000000")]
        phone: String,
        #[arg(long, help = "Property type given on the registration form (casa, apartamento, ...)")]
        property_type: Option<String>,
        #[arg(short, long = "message", help = "Seller message; repeat for several turns")]
        messages: Vec<String>,
        #[arg(long, help = "File with one seller message per line")]
        script: Option<PathBuf>,
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
        Command::Simulate { name, phone, property_type, messages, script } => {
            commands::simulate::run(commands::simulate::SimulateArgs {
                name,
                phone,
                property_type,
                messages,
                script,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
