#[cfg(test)]
#[path = "tests/address.rs"]
mod tests;

use core::fmt;

use apiary_crypto::{recover, SignError, Signer};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::overlay::{Overlay, OverlayError};

/// Identifier scoping overlay derivation and address signatures to one network.
pub type NetworkId = u64;

/// Address verification failed.
///
/// Carries no detail about which check failed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid address")]
pub struct InvalidAddress;

/// A signed claim binding an overlay identity to an underlay address.
///
/// Equality covers all three fields, so two valid signatures over the same
/// content only compare equal when byte-identical.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AddressRecord", try_from = "AddressRecord")]
pub struct OverlayAddress {
    underlay: Multiaddr,
    overlay: Overlay,
    signature: Vec<u8>,
}

impl OverlayAddress {
    /// Signs `underlay || network_id` with the local signer.
    pub fn new<S: Signer + ?Sized>(
        signer: &S,
        underlay: Multiaddr,
        overlay: Overlay,
        network_id: NetworkId,
    ) -> Result<Self, SignError> {
        let signature = signer.sign(&signed_payload(&underlay.to_vec(), network_id))?;

        Ok(Self {
            underlay,
            overlay,
            signature,
        })
    }

    /// Reconstructs a remote peer's claim and verifies it by key recovery.
    pub fn parse(
        underlay: &[u8],
        overlay: &[u8],
        signature: &[u8],
        network_id: NetworkId,
    ) -> Result<Self, InvalidAddress> {
        let public_key =
            recover(signature, &signed_payload(underlay, network_id)).map_err(|_| InvalidAddress)?;

        let recovered = Overlay::derive(&public_key, network_id);

        if recovered.as_slice() != overlay {
            return Err(InvalidAddress);
        }

        let underlay = Multiaddr::try_from(underlay.to_vec()).map_err(|_| InvalidAddress)?;

        Ok(Self {
            underlay,
            overlay: recovered,
            signature: signature.to_vec(),
        })
    }

    /// Verifies an address obtained without verification, e.g. from its wire record.
    pub fn verify(&self, network_id: NetworkId) -> Result<(), InvalidAddress> {
        let _ = Self::parse(
            &self.underlay.to_vec(),
            self.overlay.as_slice(),
            &self.signature,
            network_id,
        )?;

        Ok(())
    }

    #[must_use]
    pub const fn underlay(&self) -> &Multiaddr {
        &self.underlay
    }

    #[must_use]
    pub const fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl fmt::Display for OverlayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.overlay, self.underlay)
    }
}

fn signed_payload(underlay: &[u8], network_id: NetworkId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(underlay.len().saturating_add(8));
    payload.extend_from_slice(underlay);
    payload.extend_from_slice(&network_id.to_be_bytes());
    payload
}

/// Wire form of an [`OverlayAddress`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AddressRecord {
    pub overlay: String,
    pub underlay: String,
    pub signature: String,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AddressRecordError {
    #[error("invalid overlay: {0}")]
    Overlay(#[from] OverlayError),

    #[error("invalid underlay: {0}")]
    Underlay(#[from] multiaddr::Error),

    #[error("invalid signature encoding: {0}")]
    Signature(#[from] base64::DecodeError),
}

impl From<OverlayAddress> for AddressRecord {
    fn from(address: OverlayAddress) -> Self {
        Self {
            overlay: address.overlay.to_string(),
            underlay: address.underlay.to_string(),
            signature: STANDARD.encode(&address.signature),
        }
    }
}

impl TryFrom<AddressRecord> for OverlayAddress {
    type Error = AddressRecordError;

    fn try_from(record: AddressRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            overlay: record.overlay.parse()?,
            underlay: record.underlay.parse()?,
            signature: STANDARD.decode(record.signature)?,
        })
    }
}
