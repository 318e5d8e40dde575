// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

use crate::crypto::hkdf::{HkdfError, hkdf};
use crate::crypto::rng::{Rng, RngError};
use crate::crypto::secret::Secret;
use crate::crypto::x25519::{PUBLIC_KEY_SIZE, PublicKey, SECRET_KEY_SIZE, SecretKey, X25519Error};

/// Domain separation label bound into every derived root key.
pub const ROOT_KEY_LABEL: &[u8] = b"transport-agreement/root-key/v1";

pub const ROOT_KEY_SIZE: usize = 32;

/// Private part of an X25519 key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateKey(SecretKey);

impl PrivateKey {
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        self.0.as_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        self.0.public_key()
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SECRET_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len(), SECRET_KEY_SIZE))?;
        Ok(Self(SecretKey::from_bytes(bytes)))
    }
}

/// Ephemeral key pair generated for one key agreement session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl KeyPair {
    /// Rebuilds a key pair from its parts, refusing parts which don't belong together.
    pub fn from_parts(public_key: PublicKey, private_key: PrivateKey) -> Result<Self, CryptoError> {
        if private_key.public_key() != public_key {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

/// Symmetric secret both contacts derive for one transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootKey(Secret<ROOT_KEY_SIZE>);

impl RootKey {
    pub fn as_bytes(&self) -> &[u8; ROOT_KEY_SIZE] {
        self.0.as_bytes()
    }
}

/// Key generation, key parsing and root key derivation.
#[derive(Debug, Default)]
pub struct AgreementCrypto {
    rng: Rng,
}

impl AgreementCrypto {
    pub fn new(rng: Rng) -> Self {
        Self { rng }
    }

    pub fn rng(&self) -> &Rng {
        &self.rng
    }

    pub fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let secret_key = SecretKey::from_bytes(self.rng.random_array()?);
        Ok(KeyPair {
            public_key: secret_key.public_key(),
            private_key: PrivateKey(secret_key),
        })
    }

    /// Derives the root key from our key pair and the public key of the contact.
    ///
    /// Both public keys enter the derivation in ascending byte order, so both sides compute the
    /// same key regardless of who initiated the agreement.
    pub fn derive_root_key(
        &self,
        local: &KeyPair,
        remote: &PublicKey,
    ) -> Result<RootKey, CryptoError> {
        let shared_secret = local.private_key.0.calculate_agreement(remote)?;

        let (first, second) = if local.public_key <= *remote {
            (&local.public_key, remote)
        } else {
            (remote, &local.public_key)
        };

        let mut ikm = Vec::with_capacity(shared_secret.as_bytes().len() + 2 * PUBLIC_KEY_SIZE);
        ikm.extend_from_slice(shared_secret.as_bytes());
        ikm.extend_from_slice(first.as_bytes());
        ikm.extend_from_slice(second.as_bytes());

        let okm = hkdf::<ROOT_KEY_SIZE>(&[], &ikm, ROOT_KEY_LABEL);
        zeroize::Zeroize::zeroize(&mut ikm);

        Ok(RootKey(Secret::from_bytes(okm?)))
    }

    pub fn parse_public_key(&self, bytes: &[u8]) -> Result<PublicKey, CryptoError> {
        PublicKey::try_from(bytes)
    }

    pub fn parse_private_key(&self, bytes: &[u8]) -> Result<PrivateKey, CryptoError> {
        PrivateKey::try_from(bytes)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length {0} bytes, expected {1} bytes")]
    InvalidKeyLength(usize, usize),

    #[error("public key does not belong to private key")]
    KeyMismatch,

    #[error(transparent)]
    InvalidPublicKey(#[from] X25519Error),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    Rng(#[from] RngError),
}
