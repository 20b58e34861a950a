mod cmd;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, server::ServerSubcommand};
use panel_core::actions::DEFAULT_LOG_LINES;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "runner-panel",
    about = "Control panel for self-hosted GitHub runner hosts managed with Ansible",
    version,
    propagate_version = true
)]
struct Cli {
    /// Panel settings file
    #[arg(long, global = true, env = "RUNNER_PANEL_CONFIG", default_value = panel_core::settings::DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Ansible inventory (overrides the settings file)
    #[arg(long, global = true, env = "RUNNER_PANEL_INVENTORY")]
    inventory: Option<PathBuf>,

    /// Vault file (overrides the settings file)
    #[arg(long, global = true, env = "RUNNER_PANEL_VAULT")]
    vault: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON API
    Serve {
        /// Port to listen on (default: server.port from settings)
        #[arg(long, short = 'p')]
        port: Option<u16>,
        /// Open the status endpoint in a browser
        #[arg(long)]
        open: bool,
    },

    /// Show automation status for every server, or one
    Status {
        /// Server name or address
        host: Option<String>,
    },

    /// List runner units on a server
    Runners {
        /// Server name or address
        host: String,
    },

    /// Start a runner unit
    Start {
        host: String,
        /// Unit name, e.g. github-runner@octo-app.service
        service: String,
    },

    /// Stop a runner unit
    Stop { host: String, service: String },

    /// Restart the registration timer
    RestartAutomation { host: String },

    /// Run the registration scan now
    Scan { host: String },

    /// Tail the automation log
    Logs {
        /// Server name or address (default: first server)
        host: Option<String>,
        #[arg(long, short = 'n', default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },

    /// Manage inventory entries
    Server {
        #[command(subcommand)]
        subcommand: ServerSubcommand,
    },

    /// Inspect settings and the vault
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = context::Context::load(&cli.config, cli.inventory, cli.vault).and_then(|ctx| {
        let json = cli.json;
        match cli.command {
            Commands::Serve { port, open } => cmd::serve::run(ctx, port, open),
            Commands::Status { host } => cmd::status::run(&ctx, host.as_deref(), json),
            Commands::Runners { host } => cmd::status::runners(&ctx, &host, json),
            Commands::Start { host, service } => {
                cmd::action::run(&ctx, &host, cmd::action::Action::Start(service), json)
            }
            Commands::Stop { host, service } => {
                cmd::action::run(&ctx, &host, cmd::action::Action::Stop(service), json)
            }
            Commands::RestartAutomation { host } => {
                cmd::action::run(&ctx, &host, cmd::action::Action::RestartAutomation, json)
            }
            Commands::Scan { host } => cmd::action::run(&ctx, &host, cmd::action::Action::Scan, json),
            Commands::Logs { host, lines } => cmd::action::logs(&ctx, host.as_deref(), lines, json),
            Commands::Server { subcommand } => cmd::server::run(&ctx, subcommand, json),
            Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand, json),
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
