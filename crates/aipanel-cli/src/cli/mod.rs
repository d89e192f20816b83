//! CLI entry and dispatch.

use std::sync::Arc;

use aipanel_core::auth::{SessionInvalidation, SessionStore};
use aipanel_core::config::Config;
use aipanel_core::{Transport, interrupt, logging};
use anyhow::{Context, Result};
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "aipanel")]
#[command(version)]
#[command(about = "Stream chats with aipanel agents from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server base URL (overrides AIPANEL_SERVER_URL and config)
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Send a message to an agent and stream the reply
    Chat(commands::chat::ChatArgs),

    /// Show whether a chat session is still generating
    Status {
        /// Agent the session belongs to
        #[arg(value_name = "AGENT_ID")]
        agent: String,

        /// Session to inspect
        #[arg(long, value_name = "ID")]
        session: String,
    },

    /// Store the session token used for requests
    Login {
        /// Bearer token issued by the server
        #[arg(long)]
        token: String,
    },

    /// Forget the stored session token
    Logout,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("load config")?;
    let _log_guard = logging::init(&config.log).context("init logging")?;
    interrupt::init()?;

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli, &config).await })
}

async fn dispatch(cli: Cli, config: &Config) -> Result<()> {
    let Cli { command, server } = cli;

    match command {
        Commands::Chat(args) => {
            let transport = transport(config, server.as_deref())?;
            commands::chat::run(args, transport).await
        }
        Commands::Status { agent, session } => {
            let transport = transport(config, server.as_deref())?;
            commands::status::run(&transport, &agent, &session).await
        }
        Commands::Login { token } => commands::auth::login(&token),
        Commands::Logout => commands::auth::logout(),
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}

/// Transport bound to the resolved server, reading the token from the
/// session store.
fn transport(config: &Config, server: Option<&str>) -> Result<Transport> {
    let base = config.server_url(server)?;
    let store = SessionStore::default_location();
    let invalidation = SessionInvalidation::new(store.clone()).on_login_required(|| {
        eprintln!("Session expired. Run `aipanel login --token <TOKEN>` to sign in again.");
    });

    let transport = Transport::with_connect_timeout(base, Arc::new(store), config.connect_timeout())?
        .on_unauthorized(invalidation);
    tracing::debug!(server = %transport.base_url(), "transport ready");
    Ok(transport)
}
