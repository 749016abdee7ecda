use core::future::Future;
use std::sync::Arc;

use apiary_network_primitives::protocol;
use eyre::Result as EyreResult;
use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::peers::Peer;
use crate::stream::Stream;

/// Serves one inbound stream.
///
/// The token is cancelled when the peer starts disconnecting or the node
/// shuts down. Returning a [`DisconnectError`] anywhere in the error chain
/// severs the connection to the peer.
///
/// [`DisconnectError`]: apiary_network_primitives::error::DisconnectError
pub type HandlerFunc =
    Arc<dyn Fn(CancellationToken, Peer, Stream) -> BoxFuture<'static, EyreResult<()>> + Send + Sync>;

pub type ProtocolSpec = protocol::ProtocolSpec<HandlerFunc>;

pub fn handler<F, Fut>(f: F) -> HandlerFunc
where
    F: Fn(CancellationToken, Peer, Stream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EyreResult<()>> + Send + 'static,
{
    Arc::new(move |token, peer, stream| f(token, peer, stream).boxed())
}
