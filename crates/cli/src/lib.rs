pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};

use crate::commands::upload::UploadSource;

#[derive(Debug, Parser)]
#[command(
    name = "cartkeeper",
    about = "Cartkeeper operator CLI",
    long_about = "Operator tooling for the shopping session database and order uploads.",
    after_help = "Examples:\n  cartkeeper migrate\n  cartkeeper cart --user alice\n  cartkeeper upload --file cart.json"
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
    #[command(about = "Show a user's stored cart, or list users with a stored cart")]
    Cart {
        #[arg(long, help = "User whose cart to show; omit to list users")]
        user: Option<String>,
    },
    #[command(about = "Submit a stored or exported cart to the order endpoint once")]
    #[command(group(ArgGroup::new("source").required(true).args(["user", "file"])))]
    Upload {
        #[arg(long, help = "Upload the cart currently stored for this user")]
        user: Option<String>,
        #[arg(long, help = "Upload a cart document read from this JSON file")]
        file: Option<PathBuf>,
    },
    #[command(about = "Print a user's conversation log and recent context")]
    History {
        #[arg(long)]
        user: String,
    },
    #[command(about = "Clear a user's conversation log; the cart is kept")]
    Forget {
        #[arg(long)]
        user: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Cart { user } => commands::cart::run(user.as_deref()),
        Command::Upload { user, file } => match (user, file) {
            (Some(user), _) => commands::upload::run(UploadSource::Stored(user)),
            (None, Some(file)) => commands::upload::run(UploadSource::File(file)),
            (None, None) => commands::CommandResult::failure(
                "upload",
                "invalid_input",
                "either --user or --file is required",
                8,
            ),
        },
        Command::History { user } => commands::history::run(&user),
        Command::Forget { user } => commands::forget::run(&user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
