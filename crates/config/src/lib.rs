use std::fs::{read_to_string, write};
use std::sync::Arc;

use apiary_crypto::PrivateKey;
use apiary_network::config::{
    BootstrapConfig, HandshakeConfig, NetworkConfig as RuntimeNetworkConfig, SwarmConfig,
};
use apiary_primitives::NetworkId;
use apiary_server::config::ServerConfig;
use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    #[serde(with = "serde_identity")]
    pub identity: Keypair,

    /// Signs the overlay address this node advertises.
    #[serde(with = "serde_overlay_key")]
    pub overlay_key: PrivateKey,

    pub network: NetworkConfig,

    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub network_id: NetworkId,
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
}

impl NetworkConfig {
    #[must_use]
    pub const fn new(
        network_id: NetworkId,
        swarm: SwarmConfig,
        bootstrap: BootstrapConfig,
        handshake: HandshakeConfig,
    ) -> Self {
        Self {
            network_id,
            swarm,
            bootstrap,
            handshake,
        }
    }
}

impl ConfigFile {
    #[must_use]
    pub const fn new(
        identity: Keypair,
        overlay_key: PrivateKey,
        network: NetworkConfig,
        server: ServerConfig,
    ) -> Self {
        Self {
            identity,
            overlay_key,
            network,
            server,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration from {path:?}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }

    /// Splits the file into what the network layer runs with.
    #[must_use]
    pub fn into_network_config(self) -> (RuntimeNetworkConfig, ServerConfig) {
        let network = RuntimeNetworkConfig::new(
            self.identity,
            Arc::new(self.overlay_key),
            self.network.network_id,
            self.network.swarm,
            self.network.bootstrap,
            self.network.handshake,
        );

        (network, self.server)
    }
}

mod serde_overlay_key {
    use apiary_crypto::PrivateKey;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &PrivateKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(key.to_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PrivateKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }
}

pub mod serde_identity {
    use core::fmt::{self, Formatter};

    use libp2p_identity::{Keypair, PeerId};
    use serde::de::{self, MapAccess};
    use serde::ser::{self, SerializeMap};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(key: &Keypair, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut keypair = serializer.serialize_map(Some(2))?;
        keypair.serialize_entry("peer_id", &key.public().to_peer_id().to_base58())?;
        keypair.serialize_entry(
            "keypair",
            &bs58::encode(&key.to_protobuf_encoding().map_err(ser::Error::custom)?).into_string(),
        )?;
        keypair.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Keypair, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdentityVisitor;

        impl<'de> de::Visitor<'de> for IdentityVisitor {
            type Value = Keypair;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("an identity")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut peer_id = None::<String>;
                let mut encoded = None::<String>;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "peer_id" => peer_id = Some(map.next_value()?),
                        "keypair" => encoded = Some(map.next_value()?),
                        _ => {}
                    }
                }

                let peer_id = peer_id.ok_or_else(|| de::Error::missing_field("peer_id"))?;
                let encoded = encoded.ok_or_else(|| de::Error::missing_field("keypair"))?;

                let decoded = bs58::decode(&encoded)
                    .into_vec()
                    .map_err(de::Error::custom)?;

                let keypair =
                    Keypair::from_protobuf_encoding(&decoded).map_err(de::Error::custom)?;

                let expected: PeerId = peer_id.parse().map_err(de::Error::custom)?;

                if keypair.public().to_peer_id() != expected {
                    return Err(de::Error::custom(format!(
                        "keypair does not match peer id {expected}"
                    )));
                }

                Ok(keypair)
            }
        }

        deserializer.deserialize_map(IdentityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use apiary_crypto::Signer;
    use apiary_network::config::{BootstrapNodes, DEFAULT_NETWORK_ID};
    use camino::Utf8PathBuf;
    use tempdir::TempDir;

    use super::*;

    fn sample() -> ConfigFile {
        let bootstrap = "/ip4/10.0.0.1/tcp/1634/p2p/12D3KooWMgoF9xzyeKJHtRvrYwdomheRbHPELagWZwTLmXb6bCVC"
            .parse()
            .unwrap();

        ConfigFile::new(
            Keypair::generate_ed25519(),
            PrivateKey::random(),
            NetworkConfig::new(
                DEFAULT_NETWORK_ID,
                SwarmConfig::new(vec!["/ip4/0.0.0.0/tcp/1634".parse().unwrap()]),
                BootstrapConfig::new(BootstrapNodes::new(vec![bootstrap])),
                HandshakeConfig::default(),
            ),
            ServerConfig::new(apiary_server::config::default_addrs(1635)),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new("apiary-config").unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_owned()).unwrap();

        assert!(!ConfigFile::exists(&path));

        let config = sample();
        config.save(&path).unwrap();

        assert!(ConfigFile::exists(&path));

        let loaded = ConfigFile::load(&path).unwrap();

        assert_eq!(
            loaded.identity.public().to_peer_id(),
            config.identity.public().to_peer_id()
        );
        assert_eq!(loaded.overlay_key.to_bytes(), config.overlay_key.to_bytes());
        assert_eq!(loaded.network.network_id, DEFAULT_NETWORK_ID);
        assert_eq!(loaded.network.swarm.listen, config.network.swarm.listen);
        assert_eq!(
            loaded.network.bootstrap.nodes.list,
            config.network.bootstrap.nodes.list
        );
        assert_eq!(loaded.server.listen, config.server.listen);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new("apiary-config").unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_owned()).unwrap();

        assert!(ConfigFile::load(&path).is_err());
    }

    #[test]
    fn test_mismatched_identity_rejected() {
        let config = sample();
        let mut content = toml::to_string_pretty(&config).unwrap();

        let actual = config.identity.public().to_peer_id().to_base58();
        let other = Keypair::generate_ed25519().public().to_peer_id().to_base58();
        content = content.replace(&actual, &other);

        assert!(toml::from_str::<ConfigFile>(&content).is_err());
    }

    #[test]
    fn test_into_network_config() {
        let config = sample();
        let expected = config.overlay_key.verifying_key();

        let (network, server) = config.into_network_config();

        assert_eq!(network.network_id, DEFAULT_NETWORK_ID);
        assert_eq!(network.signer.public_key().unwrap(), expected);
        assert_eq!(server.listen.len(), 2);
    }
}
