//! Passphrase to key derivation
//!
//! The key is the first 16 bytes of SHA-256 over the passphrase. This is a
//! single unsalted hash and offers no brute-force resistance; it is kept
//! because existing `.gcm` files carry no salt and must stay decryptable.

use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{GcmboxError, Result};

/// Length of the derived AES-128 key in bytes
pub const KEY_LEN: usize = 16;

/// AES-128 key derived from a passphrase. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Wraps raw key bytes. Only known-answer tests should need this;
    /// everything else goes through [`derive_key`].
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Derive the 16-byte key for `passphrase`.
///
/// Deterministic: identical passphrase bytes always give the identical key.
/// Fails with `InvalidInput` if the passphrase is empty.
pub fn derive_key(passphrase: &[u8]) -> Result<SymmetricKey> {
    if passphrase.is_empty() {
        return Err(GcmboxError::invalid_input("passphrase must not be empty"));
    }

    let mut digest = Sha256::digest(passphrase);
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    digest.as_mut_slice().zeroize();

    Ok(SymmetricKey(key))
}
