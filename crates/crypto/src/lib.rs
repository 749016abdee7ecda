use core::fmt;
use core::str::FromStr;
use std::error::Error as StdError;

use alloy::primitives::{keccak256, Address, Signature, SignatureError};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::signers::k256::ecdsa::VerifyingKey;
use thiserror::Error;

/// Length of a recoverable `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// Length of a derived overlay identifier.
pub const OVERLAY_LEN: usize = 32;

/// Error type for signing failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignError {
    /// The signer holds no usable key.
    #[error("signing key unavailable")]
    KeyUnavailable,

    /// The underlying signature scheme failed.
    #[error("failed to produce signature")]
    Signing(#[source] Box<dyn StdError + Send + Sync>),
}

/// Error type for public key recovery failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecoverError {
    /// The signature is not exactly [`SIGNATURE_LEN`] bytes long.
    #[error("invalid signature length {0}, expected {SIGNATURE_LEN}")]
    InvalidLength(usize),

    /// The signature bytes could not be parsed or do not recover a key.
    #[error("malformed signature")]
    Signature(#[from] SignatureError),
}

/// Error type for private key decoding failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyError {
    #[error("invalid hex encoding")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid private key")]
    InvalidKey,
}

/// Produces recoverable signatures over arbitrary messages.
///
/// Implementations must be deterministic for verification by recovery to be
/// meaningful: the public key recovered from `sign(data)` over `data` must
/// equal `public_key()`.
pub trait Signer: Send + Sync + fmt::Debug {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignError>;

    fn public_key(&self) -> Result<PublicKey, SignError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// The last 20 bytes of the keccak256 hash of the uncompressed key.
    #[must_use]
    pub fn ethereum_address(&self) -> Address {
        Address::from_public_key(&self.0)
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

/// secp256k1 private key signing with the "Ethereum Signed Message" prefix.
#[derive(Clone)]
pub struct PrivateKey {
    signer: PrivateKeySigner,
}

impl PrivateKey {
    #[must_use]
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let signer = PrivateKeySigner::from_slice(bytes).map_err(|_| KeyError::InvalidKey)?;

        Ok(Self { signer })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signer.to_bytes().0
    }

    #[must_use]
    pub fn verifying_key(&self) -> PublicKey {
        PublicKey(self.signer.credential().verifying_key().clone())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl FromStr for PrivateKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;

        Self::from_bytes(&bytes)
    }
}

impl Signer for PrivateKey {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignError> {
        let signature = self
            .signer
            .sign_message_sync(data)
            .map_err(|err| SignError::Signing(Box::new(err)))?;

        Ok(signature.as_bytes().to_vec())
    }

    fn public_key(&self) -> Result<PublicKey, SignError> {
        Ok(self.verifying_key())
    }
}

/// Recovers the public key that produced `signature` over `data`.
pub fn recover(signature: &[u8], data: &[u8]) -> Result<PublicKey, RecoverError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(RecoverError::InvalidLength(signature.len()));
    }

    let signature = Signature::from_raw(signature)?;

    Ok(PublicKey(signature.recover_from_msg(data)?))
}

/// `keccak256(ethereum_address || little_endian(network_id))`
#[must_use]
pub fn derive_overlay(public_key: &PublicKey, network_id: u64) -> [u8; OVERLAY_LEN] {
    let mut data = Vec::with_capacity(28);
    data.extend_from_slice(public_key.ethereum_address().as_slice());
    data.extend_from_slice(&network_id.to_le_bytes());

    keccak256(data).0
}
