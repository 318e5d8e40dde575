// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{Dictionary, GroupId, Message, MessageId};

use crate::traits::Transaction;

/// Store for messages and the metadata records attached to them.
pub trait MessageStore: Transaction {
    /// Insert a message with its metadata into an existing group.
    ///
    /// Returns `false` if a message with the same id already exists, in which case nothing is
    /// changed.
    fn insert_message(
        &self,
        message: &Message,
        metadata: &Dictionary,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    fn message(&self, id: &MessageId)
    -> impl Future<Output = Result<Option<Message>, Self::Error>>;

    fn message_metadata(
        &self,
        id: &MessageId,
    ) -> impl Future<Output = Result<Option<Dictionary>, Self::Error>>;

    /// Overwrite the given entries in the metadata of a message, keeping all other entries.
    /// Returns `false` if the message is unknown.
    fn merge_message_metadata(
        &self,
        id: &MessageId,
        metadata: &Dictionary,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Ids of all messages in a group whose metadata matches every entry of the query, in
    /// insertion order.
    fn message_ids(
        &self,
        group_id: &GroupId,
        query: &Dictionary,
    ) -> impl Future<Output = Result<Vec<MessageId>, Self::Error>>;

    /// Metadata of all messages in a group, in insertion order.
    fn messages_metadata(
        &self,
        group_id: &GroupId,
    ) -> impl Future<Output = Result<Vec<(MessageId, Dictionary)>, Self::Error>>;
}
