#[cfg(test)]
#[path = "tests/overlay.rs"]
mod tests;

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use apiary_crypto::{derive_overlay, PublicKey, OVERLAY_LEN};
use thiserror::Error;

/// A peer's logical identity on the overlay network.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Overlay([u8; OVERLAY_LEN]);

impl Overlay {
    #[must_use]
    pub const fn new(bytes: [u8; OVERLAY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn derive(public_key: &PublicKey, network_id: u64) -> Self {
        Self(derive_overlay(public_key, network_id))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, OverlayError> {
        let bytes = bytes
            .try_into()
            .map_err(|_| OverlayError::InvalidLength(bytes.len()))?;

        Ok(Self(bytes))
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OVERLAY_LEN] {
        &self.0
    }
}

impl From<[u8; OVERLAY_LEN]> for Overlay {
    fn from(bytes: [u8; OVERLAY_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Overlay> for [u8; OVERLAY_LEN] {
    fn from(overlay: Overlay) -> Self {
        overlay.0
    }
}

impl Deref for Overlay {
    type Target = [u8; OVERLAY_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&hex::encode(self.0))
    }
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Overlay").field(&hex::encode(self.0)).finish()
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum OverlayError {
    #[error("invalid overlay length {0}, expected {OVERLAY_LEN}")]
    InvalidLength(usize),

    #[error("invalid hex")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Overlay {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl serde::Serialize for Overlay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for Overlay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OverlayVisitor;

        impl serde::de::Visitor<'_> for OverlayVisitor {
            type Value = Overlay;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded overlay address")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(OverlayVisitor)
    }
}
