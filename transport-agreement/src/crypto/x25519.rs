// SPDX-License-Identifier: MIT OR Apache-2.0

//! Elliptic-curve Diffie–Hellman key agreement over Curve25519.
use std::fmt;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::crypto::secret::Secret;

pub const PUBLIC_KEY_SIZE: usize = 32;

pub const SECRET_KEY_SIZE: usize = 32;

pub const SHARED_SECRET_SIZE: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SecretKey(Secret<SECRET_KEY_SIZE>);

impl SecretKey {
    pub(crate) fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(Secret::from_bytes(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        self.0.as_bytes()
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        let static_secret = x25519_dalek::StaticSecret::from(*self.as_bytes());
        PublicKey(*x25519_dalek::PublicKey::from(&static_secret).as_bytes())
    }

    /// Computes the shared secret with a remote public key.
    ///
    /// Fails for low-order public keys which would force an all-zero shared secret.
    pub(crate) fn calculate_agreement(
        &self,
        their_public_key: &PublicKey,
    ) -> Result<Secret<SHARED_SECRET_SIZE>, X25519Error> {
        let static_secret = x25519_dalek::StaticSecret::from(*self.as_bytes());
        let shared_secret =
            static_secret.diffie_hellman(&x25519_dalek::PublicKey::from(their_public_key.0));
        if !shared_secret.was_contributory() {
            return Err(X25519Error::NonContributory);
        }
        Ok(Secret::from_bytes(shared_secret.to_bytes()))
    }
}

/// Public part of an X25519 key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len(), PUBLIC_KEY_SIZE))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("remote public key results in a non-contributory shared secret")]
    NonContributory,
}
