use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use apiary_network_primitives::protocol::StreamTag;
use apiary_primitives::{Overlay, OverlayAddress};
use libp2p::PeerId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    /// Transport connected, handshake not yet verified.
    Connecting,
    Connected,
    /// Teardown scheduled, handlers cancelled.
    Disconnecting,
    Disconnected,
}

/// A verified peer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Peer {
    pub overlay: Overlay,
    pub peer_id: PeerId,
    pub address: OverlayAddress,
}

impl Peer {
    #[must_use]
    pub const fn new(peer_id: PeerId, address: OverlayAddress) -> Self {
        Self {
            overlay: *address.overlay(),
            peer_id,
            address,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(Peer),
    Disconnected(Overlay),
}

/// Outcome of admitting a verified peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted(Peer),
    /// The peer was already connected, its existing record is kept.
    Existing(Peer),
    /// An earlier connection to the peer is still being torn down.
    TearingDown,
}

/// The peers admitted by one node.
///
/// Only verified peers are ever inserted, and removal is the last step of a
/// peer's teardown. Every peer token is a child of the node's shutdown token.
#[derive(Clone, Debug)]
pub struct PeerSet {
    table: Arc<RwLock<PeerTable>>,
    events: broadcast::Sender<PeerEvent>,
    root: CancellationToken,
}

#[derive(Debug, Default)]
struct PeerTable {
    peers: HashMap<Overlay, PeerEntry>,
    overlays: HashMap<PeerId, Overlay>,
    connecting: HashSet<PeerId>,
    next_stream_id: u64,
}

#[derive(Debug)]
struct PeerEntry {
    peer: Peer,
    state: PeerState,
    streams: HashMap<u64, StreamTag>,
    token: CancellationToken,
}

impl PeerSet {
    pub(crate) fn new(root: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            table: Arc::default(),
            events,
            root,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn mark_connecting(&self, peer_id: PeerId) {
        let mut table = self.table.write();

        if !table.overlays.contains_key(&peer_id) {
            let _ignored = table.connecting.insert(peer_id);
        }
    }

    pub(crate) fn abort_connecting(&self, peer_id: &PeerId) {
        let _ignored = self.table.write().connecting.remove(peer_id);
    }

    /// Inserts a verified peer. A connected peer keeps its existing record,
    /// a peer still being torn down is refused until it has been removed.
    pub(crate) fn admit(&self, peer: Peer) -> Admission {
        let mut table = self.table.write();

        let _ignored = table.connecting.remove(&peer.peer_id);

        let existing = table
            .overlays
            .get(&peer.peer_id)
            .and_then(|overlay| table.peers.get(overlay))
            .or_else(|| table.peers.get(&peer.overlay));

        if let Some(entry) = existing {
            if entry.state == PeerState::Connected {
                return Admission::Existing(entry.peer.clone());
            }

            return Admission::TearingDown;
        }

        let _ignored = table.overlays.insert(peer.peer_id, peer.overlay);
        let _ignored = table.peers.insert(
            peer.overlay,
            PeerEntry {
                peer: peer.clone(),
                state: PeerState::Connected,
                streams: HashMap::new(),
                token: self.root.child_token(),
            },
        );

        drop(table);

        let _ignored = self.events.send(PeerEvent::Connected(peer.clone()));

        Admission::Admitted(peer)
    }

    /// Marks a peer as disconnecting and cancels its handlers, returning the
    /// transport identity to close.
    pub(crate) fn begin_disconnect(&self, overlay: &Overlay) -> Option<PeerId> {
        let mut table = self.table.write();
        let entry = table.peers.get_mut(overlay)?;

        entry.state = PeerState::Disconnecting;
        entry.token.cancel();

        Some(entry.peer.peer_id)
    }

    /// Drops every record of a peer whose transport connection is gone.
    pub(crate) fn remove(&self, peer_id: &PeerId) -> Option<Peer> {
        let mut table = self.table.write();

        let _ignored = table.connecting.remove(peer_id);

        let overlay = table.overlays.remove(peer_id)?;
        let entry = table.peers.remove(&overlay)?;

        drop(table);

        entry.token.cancel();

        let _ignored = self.events.send(PeerEvent::Disconnected(overlay));

        Some(entry.peer)
    }

    /// Drops every peer, as when the node stops.
    pub(crate) fn clear(&self) {
        let entries: Vec<_> = {
            let mut table = self.table.write();

            table.connecting.clear();
            table.overlays.clear();
            table.peers.drain().map(|(_, entry)| entry).collect()
        };

        for entry in entries {
            entry.token.cancel();

            let _ignored = self
                .events
                .send(PeerEvent::Disconnected(entry.peer.overlay));
        }
    }

    /// Resolves once no record of `peer_id` is being torn down.
    pub(crate) async fn removed(&self, peer_id: &PeerId) {
        let mut events = self.subscribe();

        loop {
            let Some(overlay) = self.disconnecting(peer_id) else {
                return;
            };

            match events.recv().await {
                Ok(PeerEvent::Disconnected(removed)) if removed == overlay => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            }
        }
    }

    fn disconnecting(&self, peer_id: &PeerId) -> Option<Overlay> {
        let table = self.table.read();
        let overlay = table.overlays.get(peer_id)?;

        table
            .peers
            .get(overlay)
            .filter(|entry| entry.state == PeerState::Disconnecting)
            .map(|entry| entry.peer.overlay)
    }

    pub(crate) fn register_stream(&self, overlay: &Overlay, tag: StreamTag) -> Option<StreamLease> {
        let mut table = self.table.write();

        let id = table.next_stream_id;
        table.next_stream_id = id.wrapping_add(1);

        let entry = table
            .peers
            .get_mut(overlay)
            .filter(|entry| entry.state == PeerState::Connected)?;

        let _ignored = entry.streams.insert(id, tag);

        Some(StreamLease {
            peers: self.clone(),
            overlay: *overlay,
            id,
        })
    }

    fn release_stream(&self, overlay: &Overlay, id: u64) {
        if let Some(entry) = self.table.write().peers.get_mut(overlay) {
            let _ignored = entry.streams.remove(&id);
        }
    }

    /// A connected peer together with the token its handlers derive from.
    pub(crate) fn connected(&self, overlay: &Overlay) -> Option<(Peer, CancellationToken)> {
        self.table
            .read()
            .peers
            .get(overlay)
            .filter(|entry| entry.state == PeerState::Connected)
            .map(|entry| (entry.peer.clone(), entry.token.clone()))
    }

    pub(crate) fn connected_by_peer_id(
        &self,
        peer_id: &PeerId,
    ) -> Option<(Peer, CancellationToken)> {
        let overlay = *self.table.read().overlays.get(peer_id)?;

        self.connected(&overlay)
    }

    #[must_use]
    pub fn is_admitted(&self, peer_id: &PeerId) -> bool {
        self.admitted(peer_id).is_some()
    }

    /// The record of a connected peer. Peers being torn down are excluded.
    #[must_use]
    pub fn admitted(&self, peer_id: &PeerId) -> Option<Peer> {
        self.connected_by_peer_id(peer_id).map(|(peer, _)| peer)
    }

    /// `None` once the peer has been removed, or if it never was admitted.
    #[must_use]
    pub fn state(&self, overlay: &Overlay) -> Option<PeerState> {
        self.table.read().peers.get(overlay).map(|entry| entry.state)
    }

    #[must_use]
    pub fn peer_id_state(&self, peer_id: &PeerId) -> PeerState {
        let table = self.table.read();

        if let Some(entry) = table
            .overlays
            .get(peer_id)
            .and_then(|overlay| table.peers.get(overlay))
        {
            return entry.state;
        }

        if table.connecting.contains(peer_id) {
            return PeerState::Connecting;
        }

        PeerState::Disconnected
    }

    #[must_use]
    pub fn contains(&self, overlay: &Overlay) -> bool {
        self.table.read().peers.contains_key(overlay)
    }

    /// All admitted peers, including those being torn down.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        self.table
            .read()
            .peers
            .values()
            .map(|entry| entry.peer.clone())
            .collect()
    }

    #[must_use]
    pub fn open_streams(&self, overlay: &Overlay) -> Vec<StreamTag> {
        self.table
            .read()
            .peers
            .get(overlay)
            .map(|entry| entry.streams.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Keeps a stream listed under its peer for as long as the stream lives.
#[derive(Debug)]
pub(crate) struct StreamLease {
    peers: PeerSet,
    overlay: Overlay,
    id: u64,
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.peers.release_stream(&self.overlay, self.id);
    }
}

#[cfg(test)]
mod tests {
    use apiary_crypto::{PrivateKey, Signer};

    use super::*;

    fn peer() -> Peer {
        let key = PrivateKey::random();
        let overlay = Overlay::derive(&key.public_key().unwrap(), 1);
        let underlay = "/ip4/127.0.0.1/tcp/1634".parse().unwrap();
        let address = OverlayAddress::new(&key, underlay, overlay, 1).unwrap();

        Peer::new(PeerId::random(), address)
    }

    #[test]
    fn test_admit_is_idempotent() {
        let peers = PeerSet::new(CancellationToken::new());
        let mut events = peers.subscribe();
        let peer = peer();

        peers.mark_connecting(peer.peer_id);
        assert_eq!(peers.peer_id_state(&peer.peer_id), PeerState::Connecting);
        assert_eq!(peers.state(&peer.overlay), None);

        assert_eq!(peers.admit(peer.clone()), Admission::Admitted(peer.clone()));
        assert_eq!(peers.state(&peer.overlay), Some(PeerState::Connected));
        assert_eq!(peers.peer_id_state(&peer.peer_id), PeerState::Connected);

        assert_eq!(peers.admit(peer.clone()), Admission::Existing(peer.clone()));
        assert_eq!(peers.peers(), vec![peer.clone()]);

        assert_eq!(events.try_recv().unwrap(), PeerEvent::Connected(peer));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_lifecycle() {
        let peers = PeerSet::new(CancellationToken::new());
        let peer = peer();
        let _ = peers.admit(peer.clone());

        let (_, token) = peers.connected(&peer.overlay).unwrap();
        let handler_token = token.child_token();

        let mut events = peers.subscribe();

        assert_eq!(peers.begin_disconnect(&peer.overlay), Some(peer.peer_id));
        assert_eq!(peers.state(&peer.overlay), Some(PeerState::Disconnecting));
        assert!(handler_token.is_cancelled());
        assert!(peers.connected(&peer.overlay).is_none());
        assert!(peers.contains(&peer.overlay));

        assert_eq!(peers.remove(&peer.peer_id), Some(peer.clone()));
        assert_eq!(peers.state(&peer.overlay), None);
        assert!(!peers.is_admitted(&peer.peer_id));
        assert!(peers.peers().is_empty());

        assert_eq!(
            events.try_recv().unwrap(),
            PeerEvent::Disconnected(peer.overlay)
        );

        assert!(peers.remove(&peer.peer_id).is_none());
        assert!(peers.begin_disconnect(&peer.overlay).is_none());
    }

    #[test]
    fn test_stream_leases() {
        let peers = PeerSet::new(CancellationToken::new());
        let peer = peer();
        let tag = StreamTag::new("testing", "2.3.4", "messages");

        assert!(peers.register_stream(&peer.overlay, tag.clone()).is_none());

        let _ = peers.admit(peer.clone());

        let first = peers.register_stream(&peer.overlay, tag.clone()).unwrap();
        let second = peers.register_stream(&peer.overlay, tag.clone()).unwrap();
        assert_eq!(peers.open_streams(&peer.overlay).len(), 2);

        drop(first);
        assert_eq!(peers.open_streams(&peer.overlay), vec![tag.clone()]);

        let _ = peers.begin_disconnect(&peer.overlay);
        assert!(peers.register_stream(&peer.overlay, tag).is_none());

        let _ = peers.remove(&peer.peer_id);
        drop(second);
        assert!(peers.open_streams(&peer.overlay).is_empty());
    }

    #[test]
    fn test_reconnect_is_a_new_record() {
        let peers = PeerSet::new(CancellationToken::new());
        let peer = peer();

        let _ = peers.admit(peer.clone());
        let (_, old_token) = peers.connected(&peer.overlay).unwrap();
        let _ = peers.remove(&peer.peer_id);

        assert_eq!(peers.admit(peer.clone()), Admission::Admitted(peer.clone()));

        let (_, new_token) = peers.connected(&peer.overlay).unwrap();
        assert!(old_token.is_cancelled());
        assert!(!new_token.is_cancelled());
    }

    #[test]
    fn test_disconnecting_peer_is_not_readmitted() {
        let peers = PeerSet::new(CancellationToken::new());
        let peer = peer();

        let _ = peers.admit(peer.clone());
        let _ = peers.begin_disconnect(&peer.overlay);

        assert!(peers.admitted(&peer.peer_id).is_none());
        assert!(!peers.is_admitted(&peer.peer_id));
        assert_eq!(peers.admit(peer.clone()), Admission::TearingDown);
        assert_eq!(peers.state(&peer.overlay), Some(PeerState::Disconnecting));

        let _ = peers.remove(&peer.peer_id);

        assert_eq!(peers.admit(peer.clone()), Admission::Admitted(peer.clone()));
        assert_eq!(peers.admitted(&peer.peer_id), Some(peer));
    }

    #[tokio::test]
    async fn test_removed_waits_for_teardown() {
        let peers = PeerSet::new(CancellationToken::new());
        let peer = peer();

        peers.removed(&peer.peer_id).await;

        let _ = peers.admit(peer.clone());
        peers.removed(&peer.peer_id).await;

        let _ = peers.begin_disconnect(&peer.overlay);

        let waiter = tokio::spawn({
            let peers = peers.clone();
            let peer_id = peer.peer_id;

            async move { peers.removed(&peer_id).await }
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let _ = peers.remove(&peer.peer_id);

        tokio::time::timeout(core::time::Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_clear_cancels_every_peer() {
        let root = CancellationToken::new();
        let peers = PeerSet::new(root.clone());
        let (first, second) = (peer(), peer());

        let _ = peers.admit(first.clone());
        let _ = peers.admit(second.clone());

        let (_, token) = peers.connected(&first.overlay).unwrap();
        let handler_token = token.child_token();

        let mut events = peers.subscribe();

        root.cancel();
        assert!(handler_token.is_cancelled());

        peers.clear();
        assert!(peers.peers().is_empty());
        assert_eq!(peers.peer_id_state(&second.peer_id), PeerState::Disconnected);

        let removed: Vec<_> = (0..2)
            .map(|_| match events.try_recv().unwrap() {
                PeerEvent::Disconnected(overlay) => overlay,
                event => panic!("unexpected event {event:?}"),
            })
            .collect();

        assert!(removed.contains(&first.overlay));
        assert!(removed.contains(&second.overlay));
    }
}
