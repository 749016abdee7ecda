use eyre::eyre;
use libp2p::ping;
use libp2p::swarm::SwarmEvent;
use tracing::{debug, info, trace, warn};

use super::EventHandler;
use crate::error::TransportError;
use crate::{BehaviourEvent, EventLoop};

impl EventHandler<SwarmEvent<BehaviourEvent>> for EventLoop {
    fn handle(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Ping(event)) => self.handle(event),
            SwarmEvent::Behaviour(BehaviourEvent::Stream(())) => {}
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                info!(%address, "listening");

                if let Some(outcome) = self.pending_listen.remove(&listener_id) {
                    let _ignored = outcome.send(Ok(address));
                }
            }
            SwarmEvent::ListenerClosed {
                listener_id,
                reason,
                ..
            } => {
                if let Some(outcome) = self.pending_listen.remove(&listener_id) {
                    let err = match reason {
                        Ok(()) => eyre!("listener closed"),
                        Err(err) => eyre!(err),
                    };
                    let _ignored = outcome.send(Err(err));
                }
            }
            SwarmEvent::ListenerError { listener_id, error } => {
                warn!(%error, "listener failed");

                if let Some(outcome) = self.pending_listen.remove(&listener_id) {
                    let _ignored = outcome.send(Err(eyre!(error)));
                }
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(%peer_id, ?endpoint, "connection established");

                for outcome in self.pending_dial.remove(&peer_id).into_iter().flatten() {
                    let _ignored = outcome.send(Ok(()));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(%peer_id, %error, "outgoing connection failed");

                for outcome in self.pending_dial.remove(&peer_id).into_iter().flatten() {
                    let _ignored = outcome.send(Err(TransportError::Dial(error.to_string())));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                debug!(%peer_id, ?cause, num_established, "connection closed");

                if num_established > 0 {
                    return;
                }

                if let Some(peer) = self.peers.remove(&peer_id) {
                    info!(overlay = %peer.overlay, %peer_id, "peer disconnected");
                }
            }
            _ => {}
        }
    }
}

impl EventHandler<ping::Event> for EventLoop {
    fn handle(&mut self, event: ping::Event) {
        trace!(peer_id = %event.peer, result = ?event.result, "ping");
    }
}
