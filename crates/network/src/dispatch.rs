use apiary_network_primitives::error::is_disconnect;
use apiary_network_primitives::messages::{StreamRequest, StreamResponse};
use futures_util::{SinkExt, StreamExt};
use libp2p::{PeerId, Stream as P2pStream, StreamProtocol};
use libp2p_stream::IncomingStreams;
use tokio::{select, spawn};
use tracing::{debug, info};

use crate::client::NetworkClient;
use crate::stream::{self, Stream};

pub(crate) const STREAM_PROTOCOL: StreamProtocol = StreamProtocol::new("/apiary/stream/1.0.0");

pub(crate) async fn accept_streams(client: NetworkClient, mut incoming: IncomingStreams) {
    let shutdown = client.shutdown_token();

    #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
    loop {
        let (peer_id, stream) = select! {
            () = shutdown.cancelled() => break,
            next = incoming.next() => match next {
                Some(next) => next,
                None => break,
            },
        };

        drop(spawn(serve(client.clone(), peer_id, stream)));
    }
}

async fn serve(client: NetworkClient, peer_id: PeerId, stream: P2pStream) {
    let Some((peer, token)) = client.peer_set().connected_by_peer_id(&peer_id) else {
        debug!(%peer_id, "dropping stream from unverified peer");
        return;
    };

    let deadline = client.negotiation_timeout();
    let mut framed = stream::framed::<StreamRequest>(stream);

    let request = match stream::recv(&mut framed, deadline).await {
        Ok(request) => request,
        Err(err) => {
            debug!(overlay = %peer.overlay, %err, "failed to read stream request");
            return;
        }
    };

    let resolved = match client
        .registry()
        .resolve(&request.protocol, &request.version, &request.stream)
    {
        Ok(resolved) => resolved,
        Err(cause) => {
            debug!(overlay = %peer.overlay, %cause, "rejecting stream");

            let response = StreamResponse::Rejected { cause };
            let _ignored = stream::send(&mut framed, response, deadline).await;
            let _ignored = SinkExt::<StreamResponse>::close(&mut framed).await;
            return;
        }
    };

    let Some(lease) = client
        .peer_set()
        .register_stream(&peer.overlay, resolved.tag.clone())
    else {
        debug!(overlay = %peer.overlay, "peer disconnected during negotiation");
        return;
    };

    if let Err(err) = stream::send(&mut framed, StreamResponse::Accepted, deadline).await {
        debug!(overlay = %peer.overlay, %err, "failed to accept stream");
        return;
    }

    let overlay = peer.overlay;
    let tag = resolved.tag.clone();
    let stream = Stream::new(framed, resolved.tag, overlay, lease);

    let Err(err) = (resolved.handler)(token.child_token(), peer, stream).await else {
        return;
    };

    if !is_disconnect(&err) {
        debug!(%overlay, %tag, ?err, "stream handler failed");
        return;
    }

    info!(%overlay, %tag, %err, "handler requested disconnect");

    drop(spawn(async move {
        if let Err(err) = client.disconnect(&overlay).await {
            debug!(%overlay, %err, "failed to disconnect peer");
        }
    }));
}
