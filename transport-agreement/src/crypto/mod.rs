// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives used by the key agreement.
mod agreement;
mod hkdf;
mod rng;
mod secret;
mod x25519;

pub use agreement::{
    AgreementCrypto, CryptoError, KeyPair, PrivateKey, ROOT_KEY_LABEL, ROOT_KEY_SIZE, RootKey,
};
pub use hkdf::HkdfError;
pub use rng::{Rng, RngError};
pub use x25519::{PUBLIC_KEY_SIZE, PublicKey, SECRET_KEY_SIZE, X25519Error};
