// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use transport_agreement_core::{ContactId, KeySetId, TransportId};

use crate::keys::{TransportKeySet, TransportKeyStore};
use crate::memory::{MemoryStore, MemoryStoreError};

impl TransportKeyStore for MemoryStore {
    async fn insert_transport_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        epoch: u64,
        alice: bool,
        active: bool,
    ) -> Result<KeySetId, MemoryStoreError> {
        self.tx(|state| {
            if !state.contacts.contains_key(&contact_id) {
                return Err(MemoryStoreError::UnknownContact(contact_id));
            }
            state.next_key_set_id += 1;
            let key_set_id = KeySetId::new(state.next_key_set_id);
            state.key_sets.insert(
                key_set_id,
                TransportKeySet {
                    key_set_id,
                    contact_id,
                    transport_id: transport_id.clone(),
                    epoch,
                    alice,
                    active,
                },
            );
            Ok(key_set_id)
        })
        .await
    }

    async fn set_transport_keys_active(
        &self,
        transport_id: &TransportId,
        key_set_id: KeySetId,
    ) -> Result<bool, MemoryStoreError> {
        self.tx(|state| match state.key_sets.get_mut(&key_set_id) {
            Some(key_set) if key_set.transport_id == *transport_id => {
                key_set.active = true;
                Ok(true)
            }
            _ => Ok(false),
        })
        .await
    }

    async fn contains_transport_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            Ok(state.key_sets.values().any(|key_set| {
                key_set.contact_id == contact_id && key_set.transport_id == *transport_id
            }))
        })
        .await
    }

    async fn transports_with_keys(
        &self,
    ) -> Result<HashMap<ContactId, Vec<TransportId>>, MemoryStoreError> {
        self.tx(|state| {
            let mut result: HashMap<ContactId, Vec<TransportId>> = HashMap::new();
            for key_set in state.key_sets.values() {
                let transports = result.entry(key_set.contact_id).or_default();
                if !transports.contains(&key_set.transport_id) {
                    transports.push(key_set.transport_id.clone());
                }
            }
            Ok(result)
        })
        .await
    }

    async fn transport_keys(
        &self,
        key_set_id: KeySetId,
    ) -> Result<Option<TransportKeySet>, MemoryStoreError> {
        self.tx(|state| Ok(state.key_sets.get(&key_set_id).cloned()))
            .await
    }
}
