// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory store with snapshot transactions.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use transport_agreement_core::{
    Contact, ContactId, Dictionary, Group, GroupId, KeySetId, Message, MessageId, Visibility,
};

use crate::keys::TransportKeySet;

/// In-memory store.
///
/// This does not persist data permamently, all changes are lost when the process ends. Use this
/// only in development or test contexts.
///
/// Beginning a transaction takes a snapshot of the committed state. All reads and writes operate
/// on that snapshot until it either replaces the committed state on commit or is thrown away on
/// rollback. Cloned instances share the same state and transaction.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    committed: Arc<Mutex<State>>,
    tx: Arc<Mutex<Option<State>>>,
    semaphore: Arc<Semaphore>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            committed: Arc::default(),
            tx: Arc::default(),
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Run a closure against the state of the currently open transaction.
    pub(crate) async fn tx<F, R>(&self, f: F) -> Result<R, MemoryStoreError>
    where
        F: FnOnce(&mut State) -> Result<R, MemoryStoreError>,
    {
        let mut tx_ref = self.tx.lock().await;
        let state = tx_ref.as_mut().ok_or(MemoryStoreError::TransactionMissing)?;
        f(state)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::traits::Transaction for MemoryStore {
    type Error = MemoryStoreError;

    type Permit = MemoryPermit;

    async fn begin(&self) -> Result<MemoryPermit, MemoryStoreError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MemoryStoreError::Closed)?;

        let snapshot = self.committed.lock().await.clone();
        let mut tx_ref = self.tx.lock().await;
        if tx_ref.is_some() {
            return Err(MemoryStoreError::TransactionExists);
        }
        tx_ref.replace(snapshot);

        Ok(MemoryPermit(permit))
    }

    async fn rollback(&self, permit: MemoryPermit) -> Result<(), MemoryStoreError> {
        let result = self.tx.lock().await.take();
        drop(permit);
        result.map(|_| ()).ok_or(MemoryStoreError::TransactionMissing)
    }

    async fn commit(&self, permit: MemoryPermit) -> Result<(), MemoryStoreError> {
        let Some(state) = self.tx.lock().await.take() else {
            drop(permit);
            return Err(MemoryStoreError::TransactionMissing);
        };
        *self.committed.lock().await = state;
        drop(permit);
        Ok(())
    }
}

#[allow(unused)]
#[derive(Debug)]
pub struct MemoryPermit(OwnedSemaphorePermit);

#[derive(Clone, Debug)]
pub(crate) struct GroupRecord {
    pub group: Group,
    pub contact_id: Option<ContactId>,
}

#[derive(Clone, Debug)]
pub(crate) struct MessageRecord {
    pub sequence: u64,
    pub message: Message,
    pub metadata: Dictionary,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct State {
    pub groups: HashMap<GroupId, GroupRecord>,
    pub visibilities: HashMap<(ContactId, GroupId), Visibility>,
    pub messages: HashMap<MessageId, MessageRecord>,
    pub next_sequence: u64,
    pub contacts: BTreeMap<ContactId, Contact>,
    pub key_sets: BTreeMap<KeySetId, TransportKeySet>,
    pub next_key_set_id: u64,
}

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// Queries can only ever occur if a transaction was started _before_.
    #[error("tried to interact with inexistant transaction")]
    TransactionMissing,

    #[error("transaction already exists after acquiring a fresh permit")]
    TransactionExists,

    #[error("transaction semaphore was closed")]
    Closed,

    #[error("message refers to unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("key set refers to unknown contact {0}")]
    UnknownContact(ContactId),
}
