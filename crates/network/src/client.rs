use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use apiary_crypto::Signer;
use apiary_network_primitives::error::IncompatibleStreamError;
use apiary_network_primitives::messages::{StreamRequest, StreamResponse};
use apiary_network_primitives::protocol::StreamTag;
use apiary_network_primitives::registry::{ProtocolRegistry, RegistryError};
use apiary_network_primitives::types::Addresses;
use apiary_primitives::{NetworkId, Overlay, OverlayAddress};
use eyre::Result as EyreResult;
use libp2p::{PeerId, Stream as P2pStream, StreamProtocol};
use libp2p_stream::Control;
use multiaddr::{Multiaddr, Protocol};
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{HandshakeConfig, NetworkConfig};
use crate::dispatch::STREAM_PROTOCOL;
use crate::error::{ConnectError, NetworkError, NewStreamError, TransportError};
use crate::handler::command::{Admit, Command, Dial, Disconnect, ListenOn, Listeners};
use crate::handshake;
use crate::peers::{Peer, PeerEvent, PeerSet, PeerState};
use crate::protocol::{HandlerFunc, ProtocolSpec};
use crate::stream::{self, Stream};

/// Handle to a running node. Cheap to clone.
#[derive(Clone, Debug)]
pub struct NetworkClient {
    inner: Arc<Inner>,
}

struct Inner {
    sender: mpsc::Sender<Command>,
    control: Control,
    registry: ProtocolRegistry<HandlerFunc>,
    peers: PeerSet,
    signer: Arc<dyn Signer>,
    overlay: Overlay,
    peer_id: PeerId,
    network_id: NetworkId,
    handshake: HandshakeConfig,
    shutdown: CancellationToken,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkClient")
            .field("overlay", &self.overlay)
            .field("peer_id", &self.peer_id)
            .field("network_id", &self.network_id)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl NetworkClient {
    pub(crate) fn new(
        sender: mpsc::Sender<Command>,
        control: Control,
        registry: ProtocolRegistry<HandlerFunc>,
        peers: PeerSet,
        config: &NetworkConfig,
        overlay: Overlay,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sender,
                control,
                registry,
                peers,
                signer: Arc::clone(&config.signer),
                overlay,
                peer_id: config.identity.public().to_peer_id(),
                network_id: config.network_id,
                handshake: config.handshake,
                shutdown,
            }),
        }
    }

    #[must_use]
    pub fn overlay(&self) -> Overlay {
        self.inner.overlay
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }

    #[must_use]
    pub fn network_id(&self) -> NetworkId {
        self.inner.network_id
    }

    /// Connects to the peer at `addr`, which must end in `/p2p/<peer id>`.
    ///
    /// Resolves once both sides have verified each other's address. A peer
    /// that is already connected is returned as is.
    pub async fn connect(
        &self,
        addr: Multiaddr,
        token: &CancellationToken,
    ) -> Result<Peer, ConnectError> {
        let Some(peer_id) = peer_id_of(&addr) else {
            return Err(TransportError::MissingPeerId(addr).into());
        };

        if let Some(peer) = self.inner.peers.admitted(&peer_id) {
            return Ok(peer);
        }

        // A peer still being torn down must be removed before it can be
        // admitted again as a new record.
        let teardown = timeout(self.handshake_timeout(), self.inner.peers.removed(&peer_id));

        select! {
            biased;
            () = token.cancelled() => return Err(ConnectError::Cancelled),
            result = teardown => result.map_err(|_| TransportError::Timeout)?,
        }

        self.inner.peers.mark_connecting(peer_id);

        let result = select! {
            biased;
            () = token.cancelled() => Err(ConnectError::Cancelled),
            result = self.establish(peer_id, addr) => result,
        };

        if let Err(err) = &result {
            debug!(%peer_id, %err, "failed to connect");
            self.abandon(peer_id).await;
        }

        result
    }

    async fn establish(&self, peer_id: PeerId, mut addr: Multiaddr) -> Result<Peer, ConnectError> {
        let _ignored = addr.pop();

        self.request(|outcome| {
            Command::Dial(Dial {
                peer_id,
                addr,
                outcome,
            })
        })
        .await??;

        handshake::initiate(self, peer_id).await
    }

    /// Drops a transport connection whose peer never got admitted.
    pub(crate) async fn abandon(&self, peer_id: PeerId) {
        self.inner.peers.abort_connecting(&peer_id);

        if self.inner.peers.is_admitted(&peer_id) {
            return;
        }

        let _ignored = self
            .inner
            .sender
            .send(Command::Disconnect(Disconnect { peer_id }))
            .await;
    }

    /// Starts tearing down a connected peer.
    ///
    /// Handlers serving the peer are cancelled right away, the peer is
    /// removed once its connection has closed, see [`PeerEvent::Disconnected`].
    pub async fn disconnect(&self, overlay: &Overlay) -> Result<(), NetworkError> {
        let Some(peer_id) = self.inner.peers.begin_disconnect(overlay) else {
            return Err(NetworkError::PeerNotFound(*overlay));
        };

        info!(%overlay, %peer_id, "disconnecting peer");

        self.inner
            .sender
            .send(Command::Disconnect(Disconnect { peer_id }))
            .await
            .map_err(|_| TransportError::EventLoopClosed)?;

        Ok(())
    }

    pub fn add_protocol(&self, spec: ProtocolSpec) -> Result<(), RegistryError> {
        let (name, version) = (spec.name.clone(), spec.version.clone());

        self.inner.registry.register(spec)?;

        info!(%name, %version, "protocol registered");

        Ok(())
    }

    /// Swaps the handlers of a protocol, registering it if it is new.
    pub fn replace_protocol(
        &self,
        spec: ProtocolSpec,
    ) -> Result<Option<Arc<ProtocolSpec>>, RegistryError> {
        self.inner.registry.replace(spec)
    }

    /// Registered `(name, version)` pairs.
    #[must_use]
    pub fn protocols(&self) -> Vec<(String, String)> {
        self.inner.registry.protocols()
    }

    pub(crate) fn registry(&self) -> &ProtocolRegistry<HandlerFunc> {
        &self.inner.registry
    }

    /// Opens a stream to a connected peer and negotiates it against the
    /// peer's registered protocols.
    pub async fn new_stream(
        &self,
        overlay: &Overlay,
        protocol: &str,
        version: &str,
        stream: &str,
        token: &CancellationToken,
    ) -> Result<Stream, NewStreamError> {
        let Some((peer, _)) = self.inner.peers.connected(overlay) else {
            return Err(NewStreamError::PeerNotFound(*overlay));
        };

        let tag = StreamTag::new(protocol, version, stream);

        select! {
            biased;
            () = token.cancelled() => Err(NewStreamError::Cancelled),
            result = self.negotiate(peer, tag) => result,
        }
    }

    async fn negotiate(&self, peer: Peer, tag: StreamTag) -> Result<Stream, NewStreamError> {
        let deadline = self.negotiation_timeout();

        let stream = self.open_stream(peer.peer_id, STREAM_PROTOCOL, deadline).await?;
        let mut framed = stream::framed::<StreamResponse>(stream);

        let request = StreamRequest {
            protocol: tag.protocol.clone(),
            version: tag.version.clone(),
            stream: tag.stream.clone(),
        };

        stream::send(&mut framed, request, deadline).await?;

        match stream::recv(&mut framed, deadline).await? {
            StreamResponse::Accepted => {
                let lease = self
                    .inner
                    .peers
                    .register_stream(&peer.overlay, tag.clone())
                    .ok_or(NewStreamError::PeerNotFound(peer.overlay))?;

                Ok(Stream::new(framed, tag, peer.overlay, lease))
            }
            StreamResponse::Rejected { cause } => {
                debug!(overlay = %peer.overlay, %tag, %cause, "stream rejected");

                Err(IncompatibleStreamError::new(cause).into())
            }
        }
    }

    pub(crate) async fn open_stream(
        &self,
        peer_id: PeerId,
        protocol: StreamProtocol,
        deadline: Duration,
    ) -> Result<P2pStream, TransportError> {
        let mut control = self.inner.control.clone();

        let stream = timeout(deadline, control.open_stream(peer_id, protocol))
            .await
            .map_err(|_| TransportError::Timeout)??;

        Ok(stream)
    }

    /// All admitted peers, including those being torn down.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        self.inner.peers.peers()
    }

    #[must_use]
    pub fn peer_state(&self, overlay: &Overlay) -> Option<PeerState> {
        self.inner.peers.state(overlay)
    }

    /// Tags of the streams currently open to a peer, in either direction.
    #[must_use]
    pub fn open_streams(&self, overlay: &Overlay) -> Vec<StreamTag> {
        self.inner.peers.open_streams(overlay)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.peers.subscribe()
    }

    pub(crate) fn peer_set(&self) -> &PeerSet {
        &self.inner.peers
    }

    /// The local overlay and every address this node is listening on.
    pub async fn addresses(&self) -> EyreResult<Addresses> {
        let peer_id = self.inner.peer_id;

        let underlay = self
            .listeners()
            .await?
            .into_iter()
            .map(|addr| addr.with(Protocol::P2p(peer_id)))
            .collect();

        Ok(Addresses::new(self.inner.overlay, underlay))
    }

    /// Starts listening, resolving to the address actually bound.
    pub async fn listen_on(&self, addr: Multiaddr) -> EyreResult<Multiaddr> {
        self.request(|outcome| Command::ListenOn(ListenOn { addr, outcome }))
            .await?
    }

    async fn listeners(&self) -> Result<Vec<Multiaddr>, TransportError> {
        self.request(|outcome| Command::Listeners(Listeners { outcome }))
            .await
    }

    /// The signed address advertised to peers during the handshake.
    pub(crate) async fn local_address(&self) -> Result<OverlayAddress, ConnectError> {
        let peer_id = self.inner.peer_id;

        let underlay = self
            .listeners()
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(Multiaddr::empty)
            .with(Protocol::P2p(peer_id));

        let address = OverlayAddress::new(
            &*self.inner.signer,
            underlay,
            self.inner.overlay,
            self.inner.network_id,
        )?;

        Ok(address)
    }

    pub(crate) async fn admit(&self, peer: Peer) -> Result<Peer, TransportError> {
        self.request(|outcome| Command::Admit(Admit { peer, outcome }))
            .await?
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TransportError> {
        let (sender, receiver) = oneshot::channel();

        self.inner
            .sender
            .send(command(sender))
            .await
            .map_err(|_| TransportError::EventLoopClosed)?;

        receiver.await.map_err(|_| TransportError::EventLoopClosed)
    }

    pub(crate) fn handshake_timeout(&self) -> Duration {
        self.inner.handshake.timeout
    }

    pub(crate) fn negotiation_timeout(&self) -> Duration {
        self.inner.handshake.negotiation_timeout
    }

    /// Stops the event loop and the acceptors. Every connection is dropped.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

/// The peer id an address ends in, if any.
pub(crate) fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    match addr.iter().last() {
        Some(Protocol::P2p(peer_id)) => Some(peer_id),
        _ => None,
    }
}
