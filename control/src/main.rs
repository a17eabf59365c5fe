use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use controlplane::config::{
    default_status_listen, BootstrapConfig, JoinConfig, StoreSettings, DEFAULT_CLIENT_PORT,
    DEFAULT_DATA_DIR, DEFAULT_ETCD_BINARY, DEFAULT_PEER_PORT, DEFAULT_STATUS_PORT,
};
use controlplane::embedded::Termination;
use controlplane::workflow::{self, Environment, RunningNode};

#[derive(Parser, Debug)]
#[command(name = "controlplane")]
#[command(about = "Control plane bootstrap and membership manager", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Found a new control plane cluster on this host
    Init {
        /// Cluster name
        #[arg(long, env = "CONTROLPLANE_NAME")]
        name: String,

        /// Region label stored with the cluster metadata
        #[arg(long, env = "CONTROLPLANE_REGION")]
        region: String,

        /// Address other members use to reach this node
        #[arg(long, env = "CONTROLPLANE_ADVERTISE_IP")]
        advertise_ip: String,

        /// Skip issuing the cluster TLS bundle
        #[arg(long)]
        no_certs: bool,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Join the cluster a running peer belongs to
    Join {
        /// Client address of any existing member
        #[arg(long, env = "CONTROLPLANE_PEER_IP")]
        peer_ip: String,

        /// Address other members use to reach this node
        #[arg(long, env = "CONTROLPLANE_ADVERTISE_IP")]
        advertise_ip: String,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Directory holding the local store data
    #[arg(long, env = "CONTROLPLANE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(long, default_value_t = DEFAULT_CLIENT_PORT)]
    client_port: u16,

    #[arg(long, default_value_t = DEFAULT_PEER_PORT)]
    peer_port: u16,

    /// Port of the status page on the advertise address
    #[arg(long, default_value_t = DEFAULT_STATUS_PORT)]
    status_port: u16,

    /// Do not serve the status page
    #[arg(long)]
    no_status: bool,

    /// Path to the etcd server binary
    #[arg(long, env = "CONTROLPLANE_ETCD_BINARY", default_value = DEFAULT_ETCD_BINARY)]
    etcd_binary: PathBuf,
}

impl StoreArgs {
    fn settings(&self) -> StoreSettings {
        StoreSettings {
            data_dir: self.data_dir.clone(),
            client_port: self.client_port,
            peer_port: self.peer_port,
            ..StoreSettings::default()
        }
    }

    fn status_listen(&self, advertise: &str) -> Option<String> {
        if self.no_status {
            return None;
        }
        Some(default_status_listen(advertise, self.status_port))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let node = match cli.command {
        Command::Init {
            name,
            region,
            advertise_ip,
            no_certs,
            store,
        } => {
            let mut config = BootstrapConfig::new(name, region, advertise_ip);
            config.store = store.settings();
            config.status_listen = store.status_listen(&config.advertise_address);
            config.issue_certificates = !no_certs;
            config.validate()?;

            let env = Environment::production(&store.etcd_binary)?;
            workflow::bootstrap(&config, &env)
                .await
                .context("failed to bootstrap control plane")?
        }
        Command::Join {
            peer_ip,
            advertise_ip,
            store,
        } => {
            let mut config = JoinConfig::new(peer_ip, advertise_ip);
            config.store = store.settings();
            config.status_listen = store.status_listen(&config.advertise_address);
            config.validate()?;

            let env = Environment::production(&store.etcd_binary)?;
            workflow::join(&config, &env)
                .await
                .context("failed to join control plane")?
        }
    };

    run(node).await
}

/// Block until the store exits or the process is interrupted.
async fn run(node: RunningNode) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                signal.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    info!(
        "Node {} serving control plane {}",
        node.hostname(),
        node.cluster()
    );

    match node.serve(cancel).await {
        Termination::Stopped => info!("Store instance stopped. Exiting control plane node"),
        Termination::Cancelled => info!("Control plane node shut down"),
    }
    Ok(())
}
