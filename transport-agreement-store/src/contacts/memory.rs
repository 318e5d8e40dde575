// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{Contact, ContactId};

use crate::contacts::ContactStore;
use crate::memory::{MemoryStore, MemoryStoreError};

impl ContactStore for MemoryStore {
    async fn insert_contact(&self, contact: &Contact) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            if state.contacts.contains_key(&contact.id()) {
                return Ok(false);
            }
            state.contacts.insert(contact.id(), *contact);
            Ok(true)
        })
        .await
    }

    async fn contact(&self, id: ContactId) -> Result<Option<Contact>, MemoryStoreError> {
        self.tx(|state| Ok(state.contacts.get(&id).copied())).await
    }

    async fn contacts(&self) -> Result<Vec<Contact>, MemoryStoreError> {
        self.tx(|state| Ok(state.contacts.values().copied().collect()))
            .await
    }

    async fn remove_contact(&self, id: ContactId) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            if state.contacts.remove(&id).is_none() {
                return Ok(false);
            }
            state.key_sets.retain(|_, key_set| key_set.contact_id != id);
            state
                .visibilities
                .retain(|(contact_id, _), _| *contact_id != id);
            Ok(true)
        })
        .await
    }
}
