use std::collections::hash_map::Entry;

use libp2p::swarm::dial_opts::DialOpts;
use libp2p::PeerId;
use multiaddr::Multiaddr;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::TransportError;
use crate::handler::EventHandler;
use crate::EventLoop;

#[derive(Debug)]
pub(crate) struct Dial {
    pub peer_id: PeerId,
    pub addr: Multiaddr,
    pub outcome: oneshot::Sender<Result<(), TransportError>>,
}

impl EventHandler<Dial> for EventLoop {
    fn handle(
        &mut self,
        Dial {
            peer_id,
            addr,
            outcome,
        }: Dial,
    ) {
        if self.swarm.is_connected(&peer_id) {
            let _ignored = outcome.send(Ok(()));
            return;
        }

        match self.pending_dial.entry(peer_id) {
            Entry::Occupied(mut entry) => entry.get_mut().push(outcome),
            Entry::Vacant(entry) => {
                debug!(%peer_id, %addr, "dialing peer");

                let opts = DialOpts::peer_id(peer_id).addresses(vec![addr]).build();

                match self.swarm.dial(opts) {
                    Ok(()) => {
                        let _ignored = entry.insert(vec![outcome]);
                    }
                    Err(err) => {
                        let _ignored = outcome.send(Err(TransportError::Dial(err.to_string())));
                    }
                }
            }
        }
    }
}
