// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{Dictionary, GroupId, Message, MessageId};

use crate::memory::{MemoryStore, MemoryStoreError, MessageRecord, State};
use crate::messages::MessageStore;

fn group_messages<'a>(state: &'a State, group_id: &GroupId) -> Vec<&'a MessageRecord> {
    let mut records: Vec<&MessageRecord> = state
        .messages
        .values()
        .filter(|record| record.message.group_id() == *group_id)
        .collect();
    records.sort_by_key(|record| record.sequence);
    records
}

impl MessageStore for MemoryStore {
    async fn insert_message(
        &self,
        message: &Message,
        metadata: &Dictionary,
    ) -> Result<bool, MemoryStoreError> {
        self.tx(|state| {
            if !state.groups.contains_key(&message.group_id()) {
                return Err(MemoryStoreError::UnknownGroup(message.group_id()));
            }
            if state.messages.contains_key(&message.id()) {
                return Ok(false);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.messages.insert(
                message.id(),
                MessageRecord {
                    sequence,
                    message: message.clone(),
                    metadata: metadata.clone(),
                },
            );
            Ok(true)
        })
        .await
    }

    async fn message(&self, id: &MessageId) -> Result<Option<Message>, MemoryStoreError> {
        self.tx(|state| Ok(state.messages.get(id).map(|record| record.message.clone())))
            .await
    }

    async fn message_metadata(
        &self,
        id: &MessageId,
    ) -> Result<Option<Dictionary>, MemoryStoreError> {
        self.tx(|state| Ok(state.messages.get(id).map(|record| record.metadata.clone())))
            .await
    }

    async fn merge_message_metadata(
        &self,
        id: &MessageId,
        metadata: &Dictionary,
    ) -> Result<bool, MemoryStoreError> {
        self.tx(|state| match state.messages.get_mut(id) {
            Some(record) => {
                record.metadata.merge(metadata);
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn message_ids(
        &self,
        group_id: &GroupId,
        query: &Dictionary,
    ) -> Result<Vec<MessageId>, MemoryStoreError> {
        self.tx(|state| {
            Ok(group_messages(state, group_id)
                .into_iter()
                .filter(|record| record.metadata.matches(query))
                .map(|record| record.message.id())
                .collect())
        })
        .await
    }

    async fn messages_metadata(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<(MessageId, Dictionary)>, MemoryStoreError> {
        self.tx(|state| {
            Ok(group_messages(state, group_id)
                .into_iter()
                .map(|record| (record.message.id(), record.metadata.clone()))
                .collect())
        })
        .await
    }
}
