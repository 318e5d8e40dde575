// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{ContactId, Group, GroupId, Visibility};

use crate::groups::GroupStore;
use crate::memory::{GroupRecord, MemoryStore, MemoryStoreError};

impl GroupStore for MemoryStore {
    async fn add_group(&self, group: &Group) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            if state.groups.contains_key(&group.id()) {
                return Ok(false);
            }
            state.groups.insert(
                group.id(),
                GroupRecord {
                    group: group.clone(),
                    contact_id: None,
                },
            );
            Ok(true)
        })
        .await
    }

    async fn contains_group(&self, id: &GroupId) -> Result<bool, MemoryStoreError> {
        self.tx(|state| Ok(state.groups.contains_key(id))).await
    }

    async fn group(&self, id: &GroupId) -> Result<Option<Group>, MemoryStoreError> {
        self.tx(|state| Ok(state.groups.get(id).map(|record| record.group.clone())))
            .await
    }

    async fn remove_group(&self, id: &GroupId) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            if state.groups.remove(id).is_none() {
                return Ok(false);
            }
            state
                .messages
                .retain(|_, record| record.message.group_id() != *id);
            state.visibilities.retain(|(_, group_id), _| group_id != id);
            Ok(true)
        })
        .await
    }

    async fn set_group_contact(
        &self,
        id: &GroupId,
        contact_id: ContactId,
    ) -> Result<bool, MemoryStoreError> {
        self.tx(|state| match state.groups.get_mut(id) {
            Some(record) => {
                record.contact_id = Some(contact_id);
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn group_contact(&self, id: &GroupId) -> Result<Option<ContactId>, MemoryStoreError> {
        self.tx(|state| Ok(state.groups.get(id).and_then(|record| record.contact_id)))
            .await
    }

    async fn set_group_visibility(
        &self,
        contact_id: ContactId,
        id: &GroupId,
        visibility: Visibility,
    ) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            if !state.groups.contains_key(id) {
                return Ok(false);
            }
            state.visibilities.insert((contact_id, *id), visibility);
            Ok(true)
        })
        .await
    }

    async fn group_visibility(
        &self,
        contact_id: ContactId,
        id: &GroupId,
    ) -> Result<Visibility, MemoryStoreError> {
        self.tx(|state| {
            Ok(state
                .visibilities
                .get(&(contact_id, *id))
                .copied()
                .unwrap_or_default())
        })
        .await
    }
}
