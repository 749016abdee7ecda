pub mod address;
pub mod overlay;

pub use address::{AddressRecord, AddressRecordError, InvalidAddress, NetworkId, OverlayAddress};
pub use overlay::{Overlay, OverlayError};
