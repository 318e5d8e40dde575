// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use transport_agreement_core::{ContactId, KeySetId, TransportId};

use crate::keys::TransportKeySet;
use crate::traits::Transaction;

pub trait TransportKeyStore: Transaction {
    /// Record a new key set for a contact and transport, returning its freshly assigned id.
    fn insert_transport_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        epoch: u64,
        alice: bool,
        active: bool,
    ) -> impl Future<Output = Result<KeySetId, Self::Error>>;

    /// Mark a key set as usable for outgoing connections. Returns `false` if no key set with that
    /// id exists for the transport.
    fn set_transport_keys_active(
        &self,
        transport_id: &TransportId,
        key_set_id: KeySetId,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    fn contains_transport_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// All transports per contact for which at least one key set exists.
    fn transports_with_keys(
        &self,
    ) -> impl Future<Output = Result<HashMap<ContactId, Vec<TransportId>>, Self::Error>>;

    fn transport_keys(
        &self,
        key_set_id: KeySetId,
    ) -> impl Future<Output = Result<Option<TransportKeySet>, Self::Error>>;
}
