//! Sidecar - Envoy configuration for container proxies
//!
//! This is the CLI entry point. It drives the same handler the container
//! runtime uses, which is handy for inspecting generated configs and for
//! rotating credentials by hand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sidecar::container::{ContainerConfig, Credential};
use sidecar::network::PortAllocator;
use sidecar::proxy::{synth, EnvoyConfigHandler, ProxyConfigHandler, ProxyPolicy};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Conventional exit status after SIGINT
const EXIT_INTERRUPTED: i32 = 130;

/// Sidecar - Envoy configuration for container proxies
#[derive(Parser)]
#[command(name = "sidecar")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Generate and rotate Envoy sidecar configuration", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Policy file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign proxy ports for a container
    Ports {
        /// Container descriptor (JSON or YAML)
        container: PathBuf,
        /// Print the descriptor with the ports applied instead of the mappings
        #[arg(long)]
        apply: bool,
    },

    /// Create the container's config directory and print its bind mounts
    CreateDir {
        /// Container descriptor (JSON or YAML)
        container: PathBuf,
    },

    /// Write config and secrets for a credential
    Update {
        /// Container descriptor (JSON or YAML)
        container: PathBuf,
        /// PEM certificate file
        #[arg(long)]
        cert: PathBuf,
        /// PEM private key file
        #[arg(long)]
        key: PathBuf,
    },

    /// Write an invalidated credential and wait for the proxy to reload
    Close {
        /// Container descriptor (JSON or YAML)
        container: PathBuf,
        /// PEM certificate file
        #[arg(long)]
        cert: PathBuf,
        /// PEM private key file
        #[arg(long)]
        key: PathBuf,
    },

    /// Remove the container's config directory
    RemoveDir {
        /// Container descriptor (JSON or YAML)
        container: PathBuf,
    },

    /// Print the bootstrap config without writing anything
    Render {
        /// Container descriptor (JSON or YAML)
        container: PathBuf,
        /// Admin port (defaults to the first free proxy port)
        #[arg(long)]
        admin_port: Option<u16>,
    },
}

fn load_container(path: &Path) -> Result<ContainerConfig> {
    ContainerConfig::from_file(path)
        .with_context(|| format!("Failed to load container descriptor {}", path.display()))
}

fn load_credential(cert: &Path, key: &Path) -> Result<Credential> {
    Ok(Credential {
        cert: std::fs::read_to_string(cert)
            .with_context(|| format!("Failed to read certificate {}", cert.display()))?,
        key: std::fs::read_to_string(key)
            .with_context(|| format!("Failed to read key {}", key.display()))?,
    })
}

enum CloseOutcome {
    Finished(sidecar::Result<()>),
    Interrupted,
}

/// Race the blocking close against an interrupt signal
async fn wait_for_close<I>(
    task: JoinHandle<sidecar::Result<()>>,
    interrupt: I,
) -> Result<CloseOutcome>
where
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = task => Ok(CloseOutcome::Finished(result.context("Close task failed")?)),
        signal = interrupt => {
            signal.context("Failed to listen for Ctrl-C")?;
            Ok(CloseOutcome::Interrupted)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let policy = match &cli.config {
        Some(path) => ProxyPolicy::from_file(path)
            .with_context(|| format!("Failed to load policy {}", path.display()))?,
        None => ProxyPolicy::default(),
    };
    let handler = EnvoyConfigHandler::with_system_clock(policy)?;

    match cli.command {
        Commands::Ports { container, apply } => {
            let mut container = load_container(&container)?;
            let (mappings, _) = handler.proxy_ports(&container);

            if apply {
                container.apply_proxy_ports(&mappings)?;
                println!("{}", serde_json::to_string_pretty(&container)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&mappings)?);
            }
        }

        Commands::CreateDir { container } => {
            let container = load_container(&container)?;
            let (mounts, _) = handler.create_dir(&container)?;
            println!("{}", serde_json::to_string_pretty(&mounts)?);
        }

        Commands::Update {
            container,
            cert,
            key,
        } => {
            let container = load_container(&container)?;
            let credential = load_credential(&cert, &key)?;
            handler.update(&credential, &container)?;
            println!("Updated proxy config for {}", container.guid);
        }

        Commands::Close {
            container,
            cert,
            key,
        } => {
            let container = load_container(&container)?;
            let credential = load_credential(&cert, &key)?;
            let guid = container.guid.clone();

            let task =
                tokio::task::spawn_blocking(move || handler.close(&credential, &container));
            match wait_for_close(task, tokio::signal::ctrl_c()).await? {
                CloseOutcome::Finished(result) => {
                    result?;
                    println!("Closed proxy config for {}", guid);
                }
                CloseOutcome::Interrupted => {
                    tracing::warn!("Interrupted before the proxy reload wait finished");
                    // Dropping the runtime would join the sleeping blocking task.
                    std::process::exit(EXIT_INTERRUPTED);
                }
            }
        }

        Commands::RemoveDir { container } => {
            let container = load_container(&container)?;
            handler.remove_dir(&container)?;
            println!("Removed proxy config for {}", container.guid);
        }

        Commands::Render {
            container,
            admin_port,
        } => {
            let container = load_container(&container)?;
            let policy = handler.policy();
            let admin_port = match admin_port {
                Some(port) => port,
                None => PortAllocator::new(policy.layout.port_range)
                    .pick_free_port(&container.ports, &[])?,
            };

            let config = synth::build_bootstrap(
                &container,
                admin_port,
                policy.require_client_certs,
                &policy.ads_servers,
                &policy.layout,
            )?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
