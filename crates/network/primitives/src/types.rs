use apiary_primitives::Overlay;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};

/// The local node's identity and the underlay addresses it is reachable at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Addresses {
    pub overlay: Overlay,
    pub underlay: Vec<Multiaddr>,
}

impl Addresses {
    #[must_use]
    pub const fn new(overlay: Overlay, underlay: Vec<Multiaddr>) -> Self {
        Self { overlay, underlay }
    }
}
