use tokio::sync::oneshot;
use tracing::info;

use crate::error::TransportError;
use crate::handler::EventHandler;
use crate::peers::{Admission, Peer};
use crate::EventLoop;

/// Admits a verified peer, provided its transport connection survived the
/// handshake.
#[derive(Debug)]
pub(crate) struct Admit {
    pub peer: Peer,
    pub outcome: oneshot::Sender<Result<Peer, TransportError>>,
}

impl EventHandler<Admit> for EventLoop {
    fn handle(&mut self, Admit { peer, outcome }: Admit) {
        if !self.swarm.is_connected(&peer.peer_id) {
            self.peers.abort_connecting(&peer.peer_id);
            let _ignored = outcome.send(Err(TransportError::NotConnected));
            return;
        }

        let result = match self.peers.admit(peer) {
            Admission::Admitted(peer) => {
                info!(overlay = %peer.overlay, peer_id = %peer.peer_id, "peer connected");
                Ok(peer)
            }
            Admission::Existing(peer) => Ok(peer),
            Admission::TearingDown => Err(TransportError::Disconnecting),
        };

        let _ignored = outcome.send(result);
    }
}
