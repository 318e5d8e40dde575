// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators of the key agreement manager.
use std::collections::HashMap;
use std::error::Error;
use std::time::{SystemTime, UNIX_EPOCH};

use transport_agreement_core::{ClientId, ContactId, KeySetId, TransportId, Visibility};

use crate::crypto::RootKey;

/// Key lifecycle manager deriving and rotating transport keys from agreed root keys.
pub trait KeyManager {
    type Error: Error;

    /// Install rotating transport keys derived from a root key.
    ///
    /// `epoch` is the start of the first rotation period in milliseconds since the UNIX epoch,
    /// `alice` selects our role in the derivation. Keys installed with `active = false` can be
    /// used to receive but not to send until activated.
    fn add_rotation_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        root_key: &RootKey,
        epoch: u64,
        alice: bool,
        active: bool,
    ) -> impl Future<Output = Result<KeySetId, Self::Error>>;

    /// Allow the given key sets to be used for outgoing connections.
    fn activate_keys(
        &self,
        keys: &HashMap<TransportId, KeySetId>,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Tracks which client versions a contact supports.
pub trait ClientVersioning {
    type Error: Error;

    /// Current visibility of the given client's groups towards a contact.
    fn client_visibility(
        &self,
        contact_id: ContactId,
        client_id: &ClientId,
        major_version: u32,
    ) -> impl Future<Output = Result<Visibility, Self::Error>>;
}

/// Source of the current time in milliseconds since the UNIX epoch.
pub trait Clock {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or_default()
    }
}
