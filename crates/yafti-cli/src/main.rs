mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "yafti",
    about = "First-boot setup wizard: choose actions in a web UI and run their scripts",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./yafti.yml, ./yafti.yaml, /etc/yafti.yml, /usr/share/yafti/yafti.yml)
    #[arg(long, global = true, env = "YAFTI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the wizard server
    Serve(cmd::serve::ServeArgs),

    /// List screens and actions
    List {
        /// Output as JSON
        #[arg(long, short = 'j')]
        json: bool,
    },

    /// Validate the config file
    Check,

    /// Run action scripts in this terminal
    Run(cmd::run::RunArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve(args) => cmd::serve::run(config, args),
        Commands::List { json } => cmd::list::run(config, json),
        Commands::Check => cmd::check::run(config),
        Commands::Run(args) => cmd::run::run(config, args),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
