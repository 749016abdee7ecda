//! Helpers for running several nodes inside one test process.
#![allow(dead_code, reason = "Not every test binary uses every helper")]

use core::time::Duration;
use std::sync::Arc;

use apiary_crypto::PrivateKey;
use apiary_network::client::NetworkClient;
use apiary_network::config::{BootstrapConfig, HandshakeConfig, NetworkConfig, SwarmConfig};
use apiary_network::peers::PeerEvent;
use apiary_primitives::{NetworkId, Overlay};
use libp2p_identity::Keypair;
use multiaddr::Multiaddr;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

pub const NETWORK_ID: NetworkId = 1;

const WAIT: Duration = Duration::from_secs(10);

/// Starts a node listening on a random local TCP port.
pub async fn spawn_node(network_id: NetworkId) -> NetworkClient {
    let config = NetworkConfig::new(
        Keypair::generate_ed25519(),
        Arc::new(PrivateKey::random()),
        network_id,
        SwarmConfig::new(vec!["/ip4/127.0.0.1/tcp/0".parse().unwrap()]),
        BootstrapConfig::default(),
        HandshakeConfig::default(),
    );

    apiary_network::run(&config).await.unwrap()
}

/// A dialable address of `node`, ending in its peer id.
pub async fn dial_addr(node: &NetworkClient) -> Multiaddr {
    node.addresses().await.unwrap().underlay.remove(0)
}

/// Polls `check` until it holds, giving up after a while.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .is_ok()
}

/// Waits for `overlay` to be reported as disconnected.
pub async fn disconnected(events: &mut broadcast::Receiver<PeerEvent>, overlay: Overlay) -> bool {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(PeerEvent::Disconnected(removed)) if removed == overlay => break true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break false,
            }
        }
    })
    .await
    .unwrap_or(false)
}
