use std::collections::hash_map::HashMap;

use apiary_network_primitives::registry::ProtocolRegistry;
use apiary_primitives::Overlay;
use eyre::{bail, Result as EyreResult};
use futures_util::StreamExt;
use libp2p::core::transport::ListenerId;
use libp2p::noise::Config as NoiseConfig;
use libp2p::ping::Behaviour as PingBehaviour;
use libp2p::swarm::{NetworkBehaviour, Swarm};
use libp2p::tcp::Config as TcpConfig;
use libp2p::tls::Config as TlsConfig;
use libp2p::yamux::Config as YamuxConfig;
use libp2p::{PeerId, SwarmBuilder};
use libp2p_stream::{Behaviour as StreamBehaviour, IncomingStreams};
use multiaddr::Multiaddr;
use tokio::sync::{mpsc, oneshot};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::NetworkClient;
use crate::config::NetworkConfig;
use crate::dispatch::STREAM_PROTOCOL;
use crate::error::TransportError;
use crate::handler::command::Command;
use crate::handler::EventHandler;
use crate::handshake::HANDSHAKE_PROTOCOL;
use crate::peers::PeerSet;

pub mod client;
pub mod config;
mod dispatch;
pub mod error;
mod handler;
mod handshake;
pub mod peers;
pub mod protocol;
pub mod stream;

pub use apiary_network_primitives::error::{
    is_disconnect, DisconnectError, IncompatibleStreamError, NotSupported,
};
pub use apiary_network_primitives::protocol::StreamTag;
pub use apiary_network_primitives::registry::RegistryError;
pub use apiary_network_primitives::types::Addresses;

#[derive(NetworkBehaviour)]
struct Behaviour {
    ping: PingBehaviour,
    stream: StreamBehaviour,
}

/// Starts a node: the swarm event loop, the handshake and stream acceptors,
/// the configured listeners and a best-effort connect to every bootstrap node.
pub async fn run(config: &NetworkConfig) -> EyreResult<NetworkClient> {
    let (client, event_loop, handshakes, streams) = init(config)?;

    drop(spawn(event_loop.run()));
    drop(spawn(handshake::accept_handshakes(client.clone(), handshakes)));
    drop(spawn(dispatch::accept_streams(client.clone(), streams)));

    info!(overlay = %client.overlay(), peer_id = %client.peer_id(), "network started");

    for addr in &config.swarm.listen {
        if let Err(err) = client.listen_on(addr.clone()).await {
            warn!(%addr, ?err, "failed to listen");
        }
    }

    for addr in config.bootstrap.nodes.list.iter().cloned() {
        let client = client.clone();

        drop(spawn(async move {
            let token = client.shutdown_token();

            if let Err(err) = client.connect(addr.clone(), &token).await {
                warn!(%addr, %err, "failed to connect to bootstrap node");
            }
        }));
    }

    Ok(client)
}

fn init(
    config: &NetworkConfig,
) -> EyreResult<(NetworkClient, EventLoop, IncomingStreams, IncomingStreams)> {
    let overlay = Overlay::derive(&config.signer.public_key()?, config.network_id);
    let idle_connection_timeout = config.swarm.idle_connection_timeout;

    let swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
        .with_tokio()
        .with_tcp(
            TcpConfig::default(),
            (TlsConfig::new, NoiseConfig::new),
            YamuxConfig::default,
        )?
        .with_quic()
        .with_behaviour(|_| Behaviour {
            ping: PingBehaviour::default(),
            stream: StreamBehaviour::new(),
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_connection_timeout))
        .build();

    let mut control = swarm.behaviour().stream.new_control();

    let handshakes = match control.accept(HANDSHAKE_PROTOCOL) {
        Ok(incoming_streams) => incoming_streams,
        Err(err) => {
            bail!("Failed to setup control for handshake protocol: {:?}", err)
        }
    };

    let streams = match control.accept(STREAM_PROTOCOL) {
        Ok(incoming_streams) => incoming_streams,
        Err(err) => {
            bail!("Failed to setup control for stream protocol: {:?}", err)
        }
    };

    let (command_sender, command_receiver) = mpsc::channel(32);
    let shutdown = CancellationToken::new();
    let peers = PeerSet::new(shutdown.child_token());

    let client = NetworkClient::new(
        command_sender,
        control,
        ProtocolRegistry::new(),
        peers.clone(),
        config,
        overlay,
        shutdown.clone(),
    );

    let event_loop = EventLoop::new(swarm, command_receiver, peers, shutdown);

    Ok((client, event_loop, handshakes, streams))
}

pub(crate) struct EventLoop {
    swarm: Box<Swarm<Behaviour>>,
    command_receiver: mpsc::Receiver<Command>,
    peers: PeerSet,
    shutdown: CancellationToken,
    pending_dial: HashMap<PeerId, Vec<oneshot::Sender<Result<(), TransportError>>>>,
    pending_listen: HashMap<ListenerId, oneshot::Sender<EyreResult<Multiaddr>>>,
}

impl EventLoop {
    fn new(
        swarm: Swarm<Behaviour>,
        command_receiver: mpsc::Receiver<Command>,
        peers: PeerSet,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            swarm: Box::new(swarm),
            command_receiver,
            peers,
            shutdown,
            pending_dial: HashMap::default(),
            pending_listen: HashMap::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            select! {
                () = self.shutdown.cancelled() => break,
                event = self.swarm.next() => {
                    let Some(event) = event else { break };
                    self.handle(event);
                }
                command = self.command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle(command);
                }
            }
        }

        self.peers.clear();

        info!("network event loop stopped");
    }
}
