pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::generate::GenerateArgs;

#[derive(Debug, Parser)]
#[command(
    name = "reengage",
    about = "Reengage operator CLI",
    long_about = "Operate the recommendation pipeline: migrations, demo data, one-off generation passes, maintenance sweeps and status.",
    after_help = "Examples:\n  reengage migrate\n  reengage generate --force-refresh\n  reengage generate --customer cust-regular-001 --type upsell\n  reengage status"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo customers, products and orders")]
    Seed,
    #[command(about = "Run one recommendation pass with the configured oracle")]
    Generate {
        #[arg(long, help = "Expire active recommendations and regenerate them")]
        force_refresh: bool,
        #[arg(long = "customer", value_name = "ID", help = "Limit the pass to these customers")]
        customers: Vec<String>,
        #[arg(long = "type", value_name = "TYPE", help = "Keep only these recommendation types")]
        types: Vec<String>,
    },
    #[command(about = "Expire past-due recommendations and apply the retention window")]
    Sweep,
    #[command(about = "Report oracle readiness, last generation and the next scheduled run")]
    Status,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Generate { force_refresh, customers, types } => {
            commands::generate::run(GenerateArgs { force_refresh, customers, types })
        }
        Command::Sweep => commands::sweep::run(),
        Command::Status => commands::status::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
