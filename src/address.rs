//! Tezos address classification
//!
//! Addresses are base58check strings: a 3-byte prefix followed by a 20-byte
//! public key hash (implicit accounts) or contract hash (originated contracts).

use thiserror::Error;

const TZ1_PREFIX: [u8; 3] = [6, 161, 159];
const TZ2_PREFIX: [u8; 3] = [6, 161, 161];
const TZ3_PREFIX: [u8; 3] = [6, 161, 164];
const KT1_PREFIX: [u8; 3] = [2, 90, 121];

const HASH_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// `tz1` (ed25519)
    Tz1,
    /// `tz2` (secp256k1)
    Tz2,
    /// `tz3` (p256)
    Tz3,
    /// `KT1` originated contract
    Contract,
}

impl AddressKind {
    pub fn is_implicit(&self) -> bool {
        !matches!(self, AddressKind::Contract)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding: {0}")]
    Encoding(String),

    #[error("unknown address prefix for {0}")]
    UnknownPrefix(String),

    #[error("invalid payload length {len} for {address}")]
    Length { address: String, len: usize },
}

/// Decode and classify an address, verifying its checksum
pub fn validate(address: &str) -> Result<AddressKind, AddressError> {
    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| AddressError::Encoding(e.to_string()))?;

    if decoded.len() != TZ1_PREFIX.len() + HASH_LEN {
        return Err(AddressError::Length {
            address: address.to_string(),
            len: decoded.len(),
        });
    }

    match &decoded[..3] {
        p if p == TZ1_PREFIX => Ok(AddressKind::Tz1),
        p if p == TZ2_PREFIX => Ok(AddressKind::Tz2),
        p if p == TZ3_PREFIX => Ok(AddressKind::Tz3),
        p if p == KT1_PREFIX => Ok(AddressKind::Contract),
        _ => Err(AddressError::UnknownPrefix(address.to_string())),
    }
}

/// Cheap prefix test used on hot paths where the address came from the node
pub fn is_contract(address: &str) -> bool {
    address.starts_with("KT1")
}
