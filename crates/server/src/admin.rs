use apiary_network::client::NetworkClient;
use apiary_network::Addresses;
use async_trait::async_trait;
use eyre::Result as EyreResult;

pub mod handlers;
pub mod service;

/// Where the debug API reads the node's addresses from.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn addresses(&self) -> EyreResult<Addresses>;
}

#[async_trait]
impl AddressSource for NetworkClient {
    async fn addresses(&self) -> EyreResult<Addresses> {
        Self::addresses(self).await
    }
}
