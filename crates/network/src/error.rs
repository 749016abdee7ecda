use apiary_crypto::SignError;
use apiary_network_primitives::error::IncompatibleStreamError;
use apiary_primitives::{InvalidAddress, Overlay};
use libp2p_stream::OpenStreamError;
use multiaddr::Multiaddr;
use thiserror::Error;

use crate::stream::CodecError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to dial peer: {0}")]
    Dial(String),

    #[error("no peer id in address {0}")]
    MissingPeerId(Multiaddr),

    #[error("failed to open stream")]
    OpenStream(#[from] OpenStreamError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("stream closed by peer")]
    StreamClosed,

    #[error("timed out")]
    Timeout,

    #[error("peer is not connected")]
    NotConnected,

    #[error("previous connection to peer is still closing")]
    Disconnecting,

    #[error("network event loop is not running")]
    EventLoopClosed,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddress),

    #[error("failed to sign local address")]
    Signer(#[from] SignError),

    #[error("connect cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NewStreamError {
    #[error("peer {0} not found")]
    PeerNotFound(Overlay),

    #[error(transparent)]
    Incompatible(#[from] IncompatibleStreamError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("stream negotiation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("peer {0} not found")]
    PeerNotFound(Overlay),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
