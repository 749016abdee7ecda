use core::pin::Pin;
use core::task::{Context, Poll};
use core::time::Duration;

use apiary_network_primitives::protocol::StreamTag;
use apiary_primitives::Overlay;
use futures_util::{Sink as FuturesSink, SinkExt, Stream as FuturesStream, StreamExt};
use libp2p::Stream as P2pStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

use crate::error::TransportError;
use crate::peers::StreamLease;

mod codec;

pub(crate) use codec::JsonCodec;
pub use codec::{CodecError, Message};

pub const MAX_MESSAGE_SIZE: usize = 8 * 1_024 * 1_024;

pub(crate) type Framing<T> = Framed<BufStream<Compat<P2pStream>>, JsonCodec<T>>;

pub(crate) fn framed<T>(stream: P2pStream) -> Framing<T> {
    Framed::new(BufStream::new(stream.compat()), JsonCodec::new())
}

pub(crate) async fn send<T, I: Serialize>(
    framed: &mut Framing<T>,
    item: I,
    deadline: Duration,
) -> Result<(), TransportError> {
    timeout(deadline, framed.send(item))
        .await
        .map_err(|_| TransportError::Timeout)??;

    Ok(())
}

pub(crate) async fn recv<T: DeserializeOwned>(
    framed: &mut Framing<T>,
    deadline: Duration,
) -> Result<T, TransportError> {
    match timeout(deadline, framed.next()).await {
        Err(_) => Err(TransportError::Timeout),
        Ok(None) => Err(TransportError::StreamClosed),
        Ok(Some(item)) => Ok(item?),
    }
}

/// A negotiated stream to a connected peer.
///
/// Counts as one of the peer's open streams until dropped.
#[derive(Debug)]
pub struct Stream {
    inner: Framing<Message>,
    tag: StreamTag,
    peer: Overlay,
    _lease: StreamLease,
}

impl Stream {
    pub(crate) fn new<T>(
        framed: Framing<T>,
        tag: StreamTag,
        peer: Overlay,
        lease: StreamLease,
    ) -> Self {
        Self {
            inner: framed.map_codec(|_| JsonCodec::new()),
            tag,
            peer,
            _lease: lease,
        }
    }

    #[must_use]
    pub const fn tag(&self) -> &StreamTag {
        &self.tag
    }

    #[must_use]
    pub const fn peer(&self) -> &Overlay {
        &self.peer
    }
}

impl FuturesStream for Stream {
    type Item = Result<Message, CodecError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl FuturesSink<Message> for Stream {
    type Error = CodecError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        SinkExt::<Message>::poll_ready_unpin(&mut self.inner, cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        SinkExt::<Message>::start_send_unpin(&mut self.inner, item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        SinkExt::<Message>::poll_flush_unpin(&mut self.inner, cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        SinkExt::<Message>::poll_close_unpin(&mut self.inner, cx)
    }
}
