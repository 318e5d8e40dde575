// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bookkeeping of transport key sets installed per contact and transport.
//!
//! The store only tracks which key sets exist, how they were derived and whether they are active.
//! Key material itself is owned by the key lifecycle manager.
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

use transport_agreement_core::{ContactId, KeySetId, TransportId};

pub use traits::TransportKeyStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportKeySet {
    pub key_set_id: KeySetId,
    pub contact_id: ContactId,
    pub transport_id: TransportId,
    /// Start of the rotation period, milliseconds since the UNIX epoch.
    pub epoch: u64,
    /// Whether the local peer takes the first role for this key set.
    pub alice: bool,
    pub active: bool,
}
