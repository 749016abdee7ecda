use std::fs::create_dir_all;
use std::net::IpAddr;

use apiary_config::{ConfigFile, NetworkConfig};
use apiary_crypto::PrivateKey;
use apiary_network::config::{
    BootstrapConfig, BootstrapNodes, HandshakeConfig, SwarmConfig, DEFAULT_NETWORK_ID,
    DEFAULT_PORT,
};
use apiary_server::config::ServerConfig;
use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use multiaddr::{Multiaddr, Protocol};
use tracing::{info, warn};

use crate::cli::RootArgs;

/// Initialize node configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Network this node belongs to, peers on other networks are refused
    #[arg(long, value_name = "ID")]
    #[arg(default_value_t = DEFAULT_NETWORK_ID)]
    pub network_id: u64,

    /// List of bootstrap nodes, each ending in /p2p/<peer-id>
    #[arg(long, value_name = "ADDR")]
    pub boot_nodes: Vec<Multiaddr>,

    /// Host to listen on
    #[arg(long, value_name = "HOST")]
    #[arg(default_value = "0.0.0.0,::")]
    #[arg(use_value_delimiter = true)]
    pub swarm_host: Vec<IpAddr>,

    /// Port to listen on
    #[arg(long, value_name = "PORT")]
    #[arg(default_value_t = DEFAULT_PORT)]
    pub swarm_port: u16,

    /// Host to serve the debug API on
    #[arg(long, value_name = "HOST")]
    #[arg(default_value = "127.0.0.1,::1")]
    #[arg(use_value_delimiter = true)]
    pub server_host: Vec<IpAddr>,

    /// Port to serve the debug API on
    #[arg(long, value_name = "PORT")]
    #[arg(default_value_t = apiary_server::config::DEFAULT_PORT)]
    pub server_port: u16,

    /// Force initialization even if the directory already exists
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let path = root_args.home;

        if !path.exists() {
            create_dir_all(&path)
                .wrap_err_with(|| format!("failed to create directory {path:?}"))?;
        }

        if ConfigFile::exists(&path) {
            if let Err(err) = ConfigFile::load(&path) {
                if self.force {
                    warn!(%err, "Failed to load existing configuration, overwriting");
                } else {
                    bail!("failed to load existing configuration: {err}");
                }
            }
            if !self.force {
                bail!("node is already initialized in {path:?}");
            }
        }

        for addr in &self.boot_nodes {
            let Some(Protocol::P2p(_)) = addr.iter().last() else {
                bail!("bootstrap address {addr} has no peer id");
            };
        }

        let identity = Keypair::generate_ed25519();
        let overlay_key = PrivateKey::random();

        let mut listen: Vec<Multiaddr> = vec![];

        for host in self.swarm_host {
            let host = Multiaddr::from(host);
            listen.push(host.clone().with(Protocol::Tcp(self.swarm_port)));
            listen.push(
                host.with(Protocol::Udp(self.swarm_port))
                    .with(Protocol::QuicV1),
            );
        }

        let server = ServerConfig::new(
            self.server_host
                .into_iter()
                .map(|host| Multiaddr::from(host).with(Protocol::Tcp(self.server_port)))
                .collect(),
        );

        let config = ConfigFile::new(
            identity,
            overlay_key,
            NetworkConfig::new(
                self.network_id,
                SwarmConfig::new(listen),
                BootstrapConfig::new(BootstrapNodes::new(self.boot_nodes)),
                HandshakeConfig::default(),
            ),
            server,
        );

        config.save(&path)?;

        info!(
            peer_id = %config.identity.public().to_peer_id(),
            address = %config.overlay_key.verifying_key().ethereum_address(),
            network_id = self.network_id,
            "Initialized a node in {path:?}",
        );

        Ok(())
    }
}
