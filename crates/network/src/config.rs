use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use apiary_crypto::Signer;
use apiary_primitives::NetworkId;
use libp2p::identity;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 1634;
pub const DEFAULT_NETWORK_ID: NetworkId = 1;

const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
#[non_exhaustive]
pub struct NetworkConfig {
    /// Transport identity.
    pub identity: identity::Keypair,
    /// Overlay identity, signs the addresses this node advertises.
    pub signer: Arc<dyn Signer>,
    pub network_id: NetworkId,

    pub swarm: SwarmConfig,
    pub bootstrap: BootstrapConfig,
    pub handshake: HandshakeConfig,
}

impl NetworkConfig {
    #[must_use]
    pub fn new(
        identity: identity::Keypair,
        signer: Arc<dyn Signer>,
        network_id: NetworkId,
        swarm: SwarmConfig,
        bootstrap: BootstrapConfig,
        handshake: HandshakeConfig,
    ) -> Self {
        Self {
            identity,
            signer,
            network_id,
            swarm,
            bootstrap,
            handshake,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,

    #[serde(
        rename = "idle_connection_timeout_ms",
        with = "serde_duration",
        default = "default_idle_connection_timeout"
    )]
    pub idle_connection_timeout: Duration,
}

impl SwarmConfig {
    #[must_use]
    pub const fn new(listen: Vec<Multiaddr>) -> Self {
        Self {
            listen,
            idle_connection_timeout: DEFAULT_IDLE_CONNECTION_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BootstrapConfig {
    #[serde(default)]
    pub nodes: BootstrapNodes,
}

impl BootstrapConfig {
    #[must_use]
    pub const fn new(nodes: BootstrapNodes) -> Self {
        Self { nodes }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct BootstrapNodes {
    #[serde(deserialize_with = "deserialize_bootstrap")]
    pub list: Vec<Multiaddr>,
}

impl BootstrapNodes {
    #[must_use]
    pub const fn new(list: Vec<Multiaddr>) -> Self {
        Self { list }
    }
}

/// Bounds on the frames exchanged before a peer or stream is usable.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct HandshakeConfig {
    #[serde(
        rename = "timeout_ms",
        with = "serde_duration",
        default = "default_handshake_timeout"
    )]
    pub timeout: Duration,

    #[serde(
        rename = "negotiation_timeout_ms",
        with = "serde_duration",
        default = "default_handshake_timeout"
    )]
    pub negotiation_timeout: Duration,
}

impl HandshakeConfig {
    #[must_use]
    pub const fn new(timeout: Duration, negotiation_timeout: Duration) -> Self {
        Self {
            timeout,
            negotiation_timeout,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

const fn default_idle_connection_timeout() -> Duration {
    DEFAULT_IDLE_CONNECTION_TIMEOUT
}

const fn default_handshake_timeout() -> Duration {
    DEFAULT_HANDSHAKE_TIMEOUT
}

fn deserialize_bootstrap<'de, D>(deserializer: D) -> Result<Vec<Multiaddr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct BootstrapVisitor;

    impl<'de> de::Visitor<'de> for BootstrapVisitor {
        type Value = Vec<Multiaddr>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a list of multiaddresses ending in a peer id")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut addrs = Vec::new();

            while let Some(addr) = seq.next_element::<Multiaddr>()? {
                let Some(multiaddr::Protocol::P2p(_)) = addr.iter().last() else {
                    return Err(de::Error::custom(format!(
                        "bootstrap address {addr} has no peer id"
                    )));
                };

                addrs.push(addr);
            }

            Ok(addrs)
        }
    }

    deserializer.deserialize_seq(BootstrapVisitor)
}

mod serde_duration {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_bootstrap_requires_peer_id() {
        let nodes: BootstrapNodes = serde_json::from_value(json!([
            "/ip4/127.0.0.1/tcp/1634/p2p/12D3KooWMgoF9xzyeKJHtRvrYwdomheRbHPELagWZwTLmXb6bCVC"
        ]))
        .unwrap();
        assert_eq!(nodes.list.len(), 1);

        let err = serde_json::from_value::<BootstrapNodes>(json!(["/ip4/127.0.0.1/tcp/1634"]))
            .unwrap_err();
        assert!(err.to_string().contains("has no peer id"));
    }

    #[test]
    fn test_durations_in_millis() {
        let handshake: HandshakeConfig =
            serde_json::from_value(json!({ "timeout_ms": 2500 })).unwrap();

        assert_eq!(handshake.timeout, Duration::from_millis(2500));
        assert_eq!(handshake.negotiation_timeout, DEFAULT_HANDSHAKE_TIMEOUT);

        let swarm = SwarmConfig::new(vec![]);
        assert_eq!(
            serde_json::to_value(&swarm).unwrap(),
            json!({ "listen": [], "idle_connection_timeout_ms": 3_600_000 })
        );
    }
}
