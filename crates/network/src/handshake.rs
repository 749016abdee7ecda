use apiary_network_primitives::messages::{HandshakeRequest, HandshakeResponse};
use apiary_primitives::{InvalidAddress, NetworkId, OverlayAddress};
use futures_util::{SinkExt, StreamExt};
use libp2p::{PeerId, Stream as P2pStream, StreamProtocol};
use libp2p_stream::IncomingStreams;
use tokio::time::timeout;
use tokio::{select, spawn};
use tracing::{debug, warn};

use crate::client::{peer_id_of, NetworkClient};
use crate::error::ConnectError;
use crate::peers::Peer;
use crate::stream;

pub(crate) const HANDSHAKE_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/apiary/handshake/1.0.0");

/// Dialer side: advertise our address, then verify and admit the responder.
pub(crate) async fn initiate(client: &NetworkClient, peer_id: PeerId) -> Result<Peer, ConnectError> {
    let deadline = client.handshake_timeout();
    let address = client.local_address().await?;

    let stream = client
        .open_stream(peer_id, HANDSHAKE_PROTOCOL, deadline)
        .await?;
    let mut framed = stream::framed::<HandshakeResponse>(stream);

    stream::send(&mut framed, HandshakeRequest { address }, deadline).await?;

    let HandshakeResponse::Accepted { address } = stream::recv(&mut framed, deadline).await? else {
        debug!(%peer_id, "our address was rejected");
        return Err(InvalidAddress.into());
    };

    let peer = verify(peer_id, address, client.network_id())?;

    Ok(client.admit(peer).await?)
}

/// Responder side: verify and admit the dialer before answering with our
/// own address.
async fn respond(
    client: &NetworkClient,
    peer_id: PeerId,
    stream: P2pStream,
) -> Result<Peer, ConnectError> {
    client.peer_set().mark_connecting(peer_id);

    let deadline = client.handshake_timeout();
    let mut framed = stream::framed::<HandshakeRequest>(stream);

    let HandshakeRequest { address } = stream::recv(&mut framed, deadline).await?;

    let peer = match verify(peer_id, address, client.network_id()) {
        Ok(peer) => peer,
        Err(err) => {
            let _ignored = stream::send(&mut framed, HandshakeResponse::Rejected, deadline).await;
            let _ignored = SinkExt::<HandshakeResponse>::close(&mut framed).await;

            // Give the dialer a chance to read the rejection before the
            // connection goes away.
            let _ignored = timeout(deadline, framed.next()).await;

            return Err(err.into());
        }
    };

    let address = client.local_address().await?;
    let peer = client.admit(peer).await?;

    stream::send(&mut framed, HandshakeResponse::Accepted { address }, deadline).await?;

    Ok(peer)
}

/// An address is accepted only if it verifies under our network id and was
/// advertised by the transport identity that sent it.
fn verify(
    peer_id: PeerId,
    address: OverlayAddress,
    network_id: NetworkId,
) -> Result<Peer, InvalidAddress> {
    address.verify(network_id)?;

    if peer_id_of(address.underlay()) != Some(peer_id) {
        return Err(InvalidAddress);
    }

    Ok(Peer::new(peer_id, address))
}

pub(crate) async fn accept_handshakes(client: NetworkClient, mut incoming: IncomingStreams) {
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

        let client = client.clone();

        drop(spawn(async move {
            if let Err(err) = respond(&client, peer_id, stream).await {
                warn!(%peer_id, %err, "inbound handshake failed");
                client.abandon(peer_id).await;
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use apiary_crypto::{PrivateKey, Signer};
    use apiary_primitives::Overlay;
    use multiaddr::{Multiaddr, Protocol};

    use super::*;

    fn address(underlay: Multiaddr, network_id: NetworkId) -> OverlayAddress {
        let key = PrivateKey::random();
        let overlay = Overlay::derive(&key.public_key().unwrap(), network_id);

        OverlayAddress::new(&key, underlay, overlay, network_id).unwrap()
    }

    #[test]
    fn test_verify_binds_transport_identity() {
        let peer_id = PeerId::random();
        let underlay: Multiaddr = "/ip4/127.0.0.1/tcp/1634".parse().unwrap();

        let ours = address(underlay.clone().with(Protocol::P2p(peer_id)), 7);
        let peer = verify(peer_id, ours.clone(), 7).unwrap();
        assert_eq!(peer.overlay, *ours.overlay());
        assert_eq!(peer.peer_id, peer_id);

        let theirs = address(underlay.clone().with(Protocol::P2p(PeerId::random())), 7);
        assert_eq!(verify(peer_id, theirs, 7), Err(InvalidAddress));

        let bare = address(underlay, 7);
        assert_eq!(verify(peer_id, bare, 7), Err(InvalidAddress));
    }

    #[test]
    fn test_verify_rejects_other_network() {
        let peer_id = PeerId::random();
        let underlay = Multiaddr::empty().with(Protocol::P2p(peer_id));

        assert_eq!(verify(peer_id, address(underlay, 1), 2), Err(InvalidAddress));
    }
}
