// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{ContactId, Group, GroupId, Visibility};

use crate::traits::Transaction;

/// Store for message groups, the contact they are bound to and their visibility towards
/// contacts.
pub trait GroupStore: Transaction {
    /// Add a group. Returns `false` if the group already exists.
    fn add_group(&self, group: &Group) -> impl Future<Output = Result<bool, Self::Error>>;

    fn contains_group(&self, id: &GroupId) -> impl Future<Output = Result<bool, Self::Error>>;

    fn group(&self, id: &GroupId) -> impl Future<Output = Result<Option<Group>, Self::Error>>;

    /// Remove a group with all its messages, their metadata and visibility settings.
    fn remove_group(&self, id: &GroupId) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Bind a group to the contact it is shared with. Returns `false` if the group is unknown.
    fn set_group_contact(
        &self,
        id: &GroupId,
        contact_id: ContactId,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    fn group_contact(
        &self,
        id: &GroupId,
    ) -> impl Future<Output = Result<Option<ContactId>, Self::Error>>;

    /// Set the visibility of a group towards a contact. Returns `false` if the group is unknown.
    fn set_group_visibility(
        &self,
        contact_id: ContactId,
        id: &GroupId,
        visibility: Visibility,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Visibility of a group towards a contact, `Invisible` if it was never set.
    fn group_visibility(
        &self,
        contact_id: ContactId,
        id: &GroupId,
    ) -> impl Future<Output = Result<Visibility, Self::Error>>;
}
