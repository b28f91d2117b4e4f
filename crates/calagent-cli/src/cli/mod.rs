//! CLI entry and dispatch.

use anyhow::{Context, Result};
use calagent_core::config;
use calagent_core::logging;
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "calagent")]
#[command(version)]
#[command(about = "Calendar Agent command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the OAuth provider from config
    #[arg(long, global = true, value_name = "PROVIDER")]
    provider: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in through the backend's OAuth redirect flow
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long = "no-browser", env = "CALAGENT_NO_BROWSER")]
        no_browser: bool,

        /// Complete login from a redirect URL (or bare token) instead of waiting
        #[arg(long = "callback-url", value_name = "URL")]
        callback_url: Option<String>,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show the signed-in user (verifies the stored token with the backend)
    Whoami,

    /// Show the local session state without contacting the backend
    Status,

    /// Call a backend endpoint with the session's bearer token
    Request {
        /// Endpoint path, e.g. /calendar/events
        #[arg(value_name = "PATH")]
        path: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// JSON request body
        #[arg(short = 'd', long, value_name = "JSON")]
        data: Option<String>,

        /// Extra header, e.g. 'X-Request-Id: 1' (repeatable)
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage the stored cookie consent decision
    Consent {
        #[command(subcommand)]
        command: ConsentCommands,
    },

    /// Public waitlist endpoints
    Waitlist {
        #[command(subcommand)]
        command: WaitlistCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

#[derive(clap::Subcommand)]
enum ConsentCommands {
    /// Show the stored decision
    Show,
    /// Record acceptance
    Accept,
    /// Record rejection
    Reject,
    /// Forget the decision
    Clear,
}

#[derive(clap::Subcommand)]
enum WaitlistCommands {
    /// Show the number of signups
    Stats,
    /// Join the waitlist
    Join(commands::waitlist::JoinArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::load().context("load config")?;
    if let Some(provider) = cli.provider.as_deref().map(str::trim) {
        if provider.is_empty() {
            anyhow::bail!("--provider cannot be empty");
        }
        config.provider = provider.to_string();
    }

    let _log_guard = match logging::init(&config.logging, &config::paths::logs_dir()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli.command, &config).await })
}

async fn dispatch(command: Commands, config: &config::Config) -> Result<()> {
    match command {
        Commands::Login {
            no_browser,
            callback_url,
        } => commands::auth::login(config, no_browser, callback_url.as_deref()).await,
        Commands::Logout => commands::auth::logout(config),
        Commands::Whoami => commands::auth::whoami(config).await,
        Commands::Status => commands::auth::status(),

        Commands::Request {
            path,
            method,
            data,
            headers,
        } => {
            commands::request::run(
                config,
                commands::request::RequestArgs {
                    path: &path,
                    method: &method,
                    data: data.as_deref(),
                    headers: &headers,
                },
            )
            .await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },

        Commands::Consent { command } => match command {
            ConsentCommands::Show => commands::consent::show(),
            ConsentCommands::Accept => {
                commands::consent::record(calagent_core::consent::Consent::Accepted)
            }
            ConsentCommands::Reject => {
                commands::consent::record(calagent_core::consent::Consent::Rejected)
            }
            ConsentCommands::Clear => commands::consent::clear(),
        },

        Commands::Waitlist { command } => match command {
            WaitlistCommands::Stats => commands::waitlist::stats(config).await,
            WaitlistCommands::Join(args) => commands::waitlist::join(config, args).await,
        },
    }
}
