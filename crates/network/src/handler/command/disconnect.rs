use libp2p::PeerId;
use tracing::{debug, info};

use crate::handler::EventHandler;
use crate::EventLoop;

#[derive(Debug)]
pub(crate) struct Disconnect {
    pub peer_id: PeerId,
}

impl EventHandler<Disconnect> for EventLoop {
    fn handle(&mut self, Disconnect { peer_id }: Disconnect) {
        if self.swarm.disconnect_peer_id(peer_id).is_ok() {
            debug!(%peer_id, "closing connection");
            return;
        }

        // No connection left to report its closing, drop the record here.
        if let Some(peer) = self.peers.remove(&peer_id) {
            info!(overlay = %peer.overlay, %peer_id, "peer disconnected");
        }
    }
}
