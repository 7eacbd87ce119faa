//! dwd — dependency watchdog command line.
//!
//! ```text
//! dwd init --path watchdog.toml
//! dwd validate --config watchdog.toml
//! dwd plan --config watchdog.toml --namespace shoot--dev--a --direction scale-down
//! dwd watch --config watchdog.toml --namespace shoot--dev--a \
//!     --internal kube-apiserver:443 --external api.example.com:443
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use watchdog_core::ScaleDirection;

mod commands;

#[derive(Parser)]
#[command(
    name = "dwd",
    about = "Dependency watchdog — scales control plane dependents on API server outages",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter watchdog.toml
    Init {
        #[arg(short, long, default_value = "watchdog.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate a configuration file
    Validate {
        #[arg(short, long, default_value = "watchdog.toml")]
        config: PathBuf,
    },
    /// Print the scaling flow for a namespace without executing it
    Plan {
        #[arg(short, long, default_value = "watchdog.toml")]
        config: PathBuf,
        #[arg(short, long)]
        namespace: String,
        /// scale-up or scale-down
        #[arg(short, long)]
        direction: ScaleDirection,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Probe a control plane over HTTP and simulate the resulting flows.
    ///
    /// Dependents are held in memory, so no cluster is modified. Stops on
    /// Ctrl-C.
    Watch {
        #[arg(short, long, default_value = "watchdog.toml")]
        config: PathBuf,
        #[arg(short, long)]
        namespace: String,
        /// Internal API server address (host:port)
        #[arg(long)]
        internal: String,
        /// External API server address (host:port)
        #[arg(long)]
        external: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,dwd=debug,watchdog=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => commands::config::init(&path, force),
        Commands::Validate { config } => commands::config::validate(&config),
        Commands::Plan {
            config,
            namespace,
            direction,
            format,
        } => commands::plan::plan(&config, &namespace, direction, &format),
        Commands::Watch {
            config,
            namespace,
            internal,
            external,
        } => commands::watch::watch(&config, &namespace, &internal, &external).await,
    }
}
