// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{Contact, ContactId};

use crate::traits::Transaction;

/// Store holding the contacts of the local author.
pub trait ContactStore: Transaction {
    /// Insert a contact. Returns `false` if a contact with the same id already exists.
    fn insert_contact(&self, contact: &Contact) -> impl Future<Output = Result<bool, Self::Error>>;

    fn contact(&self, id: ContactId) -> impl Future<Output = Result<Option<Contact>, Self::Error>>;

    /// All contacts, ordered by their id.
    fn contacts(&self) -> impl Future<Output = Result<Vec<Contact>, Self::Error>>;

    /// Remove a contact together with all transport key sets held for it.
    fn remove_contact(&self, id: ContactId) -> impl Future<Output = Result<bool, Self::Error>>;
}
