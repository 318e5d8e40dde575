// SPDX-License-Identifier: MIT OR Apache-2.0

//! Causally ordered delivery of incoming messages to the key agreement manager.
//!
//! Messages are validated first. Messages whose dependencies were not delivered yet are held
//! back until they are, messages depending on an invalid message are invalid themselves. Every
//! delivery runs in its own store transaction: accepted messages are stored together with all
//! state changes the manager made, rejected and deferred messages leave no trace in the store.
//!
//! ```text
//! KEY(A) <-- ACTIVATE(A)
//! ```
//!
//! An ACTIVATE message arriving before the KEY message it depends on stays pending until the
//! KEY message got delivered.
//!
//! Bookkeeping of delivered, pending and deferred messages is held in memory. Dependencies this
//! bookkeeping doesn't know about are looked up in the store, so messages delivered before a
//! restart still count as delivered.
use std::collections::HashMap;

use tracing::{debug, warn};
use transport_agreement_core::{Message, MessageId};
use transport_agreement_store::orderer::{OrdererMemoryStore, OrdererStore};
use transport_agreement_store::{
    ContactStore, GroupStore, MessageStore, Transaction, TransportKeyStore,
};

use crate::manager::{AgreementError, DeliveryAction, ManagerError, TransportKeyAgreementManager};
use crate::message::MSG_KEY_LOCAL;
use crate::traits::{ClientVersioning, Clock, KeyManager};
use crate::validator::{MessageContext, validate_message};

/// Where a received message currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    /// Accepted by the manager and stored.
    Delivered,

    /// Waiting for its dependencies to be delivered.
    Pending,

    /// Postponed by the manager, see [`Delivery::retry_deferred`].
    Deferred,

    /// Malformed, rejected or depending on an invalid message.
    Invalid,
}

#[derive(Debug, Default)]
pub struct Delivery {
    orderer: OrdererMemoryStore<MessageId>,
    states: HashMap<MessageId, DeliveryState>,
    waiting: HashMap<MessageId, (Message, MessageContext)>,
    deferred: Vec<MessageId>,
}

impl Delivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &MessageId) -> Option<DeliveryState> {
        self.states.get(id).copied()
    }

    /// Ids of all deferred messages in the order they were deferred.
    pub fn deferred(&self) -> &[MessageId] {
        &self.deferred
    }

    /// Validate a message and deliver it as soon as its dependencies are met.
    ///
    /// Delivering a message also delivers all pending messages which only waited for it.
    /// Receiving the same message twice returns its current state without processing it again.
    pub async fn receive<S, K, V, C>(
        &mut self,
        manager: &TransportKeyAgreementManager<S, K, V, C>,
        message: Message,
    ) -> Result<DeliveryState, AgreementError<S, K, V>>
    where
        S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
        K: KeyManager,
        V: ClientVersioning,
        C: Clock,
    {
        let id = message.id();
        if let Some(state) = self.state(&id) {
            debug!(%id, ?state, "ignoring duplicate message");
            return Ok(state);
        }

        let context = match validate_message(&message) {
            Ok(context) => context,
            Err(err) => {
                warn!(%id, %err, "received invalid message");
                self.states.insert(id, DeliveryState::Invalid);
                return Ok(DeliveryState::Invalid);
            }
        };

        let invalid_dependency = context
            .dependencies
            .iter()
            .any(|dependency| self.state(dependency) == Some(DeliveryState::Invalid));
        if invalid_dependency {
            debug!(%id, "message depends on invalid message");
            self.states.insert(id, DeliveryState::Invalid);
            return Ok(DeliveryState::Invalid);
        }

        let Ok(mut ready) = self.orderer.ready(&context.dependencies).await;
        if !ready {
            // Dependencies might have been delivered before this queue was created.
            self.restore_delivered(manager, &context.dependencies)
                .await?;
            let Ok(restored) = self.orderer.ready(&context.dependencies).await;
            ready = restored;
        }
        if !ready {
            debug!(%id, dependencies = ?context.dependencies, "message is pending");
            let Ok(_) = self
                .orderer
                .mark_pending(id, context.dependencies.clone())
                .await;
            self.states.insert(id, DeliveryState::Pending);
            self.waiting.insert(id, (message, context));
            return Ok(DeliveryState::Pending);
        }

        self.settle(manager, message, context).await
    }

    /// Deliver all deferred messages again, for example after the supported transports changed.
    pub async fn retry_deferred<S, K, V, C>(
        &mut self,
        manager: &TransportKeyAgreementManager<S, K, V, C>,
    ) -> Result<Vec<(MessageId, DeliveryState)>, AgreementError<S, K, V>>
    where
        S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
        K: KeyManager,
        V: ClientVersioning,
        C: Clock,
    {
        let queue = std::mem::take(&mut self.deferred);
        let mut results = Vec::new();
        for (index, id) in queue.iter().enumerate() {
            let Some((message, context)) = self.waiting.remove(id) else {
                continue;
            };
            match self.settle(manager, message, context).await {
                Ok(state) => results.push((*id, state)),
                Err(err) => {
                    // The failed message is deferred again, everything after it stays queued.
                    for id in &queue[index + 1..] {
                        if !self.deferred.contains(id) {
                            self.deferred.push(*id);
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    /// Hand a message with all dependencies met to the manager and record the outcome.
    async fn settle<S, K, V, C>(
        &mut self,
        manager: &TransportKeyAgreementManager<S, K, V, C>,
        message: Message,
        context: MessageContext,
    ) -> Result<DeliveryState, AgreementError<S, K, V>>
    where
        S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
        K: KeyManager,
        V: ClientVersioning,
        C: Clock,
    {
        let id = message.id();
        let state = match deliver(manager, &message, &context).await {
            Ok(state) => state,
            Err(err) => {
                // Keep the message around so it can be retried.
                self.defer(id, message, context);
                return Err(err);
            }
        };

        match state {
            DeliveryState::Delivered => {
                debug!(%id, "delivered message");
                self.states.insert(id, DeliveryState::Delivered);
                let Ok(_) = self.orderer.mark_ready(id).await;
                self.process_pending(manager, id).await?;
            }
            DeliveryState::Deferred => {
                debug!(%id, "deferred message");
                self.defer(id, message, context);
            }
            DeliveryState::Invalid | DeliveryState::Pending => {
                debug!(%id, "rejected message");
                self.invalidate(id).await;
            }
        }

        Ok(state)
    }

    /// Deliver all pending messages which depend on the given message and have all their
    /// dependencies met now.
    async fn process_pending<S, K, V, C>(
        &mut self,
        manager: &TransportKeyAgreementManager<S, K, V, C>,
        id: MessageId,
    ) -> Result<(), AgreementError<S, K, V>>
    where
        S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
        K: KeyManager,
        V: ClientVersioning,
        C: Clock,
    {
        let Ok(dependents) = self.orderer.get_next_pending(id).await;
        for (next_id, next_dependencies) in dependents.into_iter().flatten() {
            let Ok(ready) = self.orderer.ready(&next_dependencies).await;
            if !ready || self.state(&next_id) != Some(DeliveryState::Pending) {
                continue;
            }
            let Some((message, context)) = self.waiting.remove(&next_id) else {
                continue;
            };
            Box::pin(self.settle(manager, message, context)).await?;
        }

        let Ok(_) = self.orderer.remove_pending(id).await;
        Ok(())
    }

    /// Mark a message and all messages pending on it as invalid.
    async fn invalidate(&mut self, id: MessageId) {
        self.states.insert(id, DeliveryState::Invalid);
        self.waiting.remove(&id);

        let Ok(dependents) = self.orderer.get_next_pending(id).await;
        for (next_id, _) in dependents.into_iter().flatten() {
            if self.state(&next_id) == Some(DeliveryState::Pending) {
                Box::pin(self.invalidate(next_id)).await;
            }
        }

        let Ok(_) = self.orderer.remove_pending(id).await;
    }

    /// Mark dependencies unknown to this queue as delivered if they are stored as received
    /// messages.
    async fn restore_delivered<S, K, V, C>(
        &mut self,
        manager: &TransportKeyAgreementManager<S, K, V, C>,
        dependencies: &[MessageId],
    ) -> Result<(), AgreementError<S, K, V>>
    where
        S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
        K: KeyManager,
        V: ClientVersioning,
        C: Clock,
    {
        let unknown: Vec<MessageId> = dependencies
            .iter()
            .filter(|dependency| self.state(dependency).is_none())
            .copied()
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }

        let store = manager.store();
        let permit = store.begin().await.map_err(ManagerError::Store)?;
        let delivered = match stored_remote_messages(store, &unknown).await {
            Ok(delivered) => {
                store.commit(permit).await.map_err(ManagerError::Store)?;
                delivered
            }
            Err(err) => {
                store.rollback(permit).await.map_err(ManagerError::Store)?;
                return Err(ManagerError::Store(err));
            }
        };

        for id in delivered {
            debug!(%id, "restored delivered message from store");
            self.states.insert(id, DeliveryState::Delivered);
            let Ok(_) = self.orderer.mark_ready(id).await;
        }
        Ok(())
    }

    fn defer(&mut self, id: MessageId, message: Message, context: MessageContext) {
        self.states.insert(id, DeliveryState::Deferred);
        self.waiting.insert(id, (message, context));
        if !self.deferred.contains(&id) {
            self.deferred.push(id);
        }
    }
}

/// Ids of the given messages which are stored as received from a contact.
async fn stored_remote_messages<S>(
    store: &S,
    ids: &[MessageId],
) -> Result<Vec<MessageId>, <S as Transaction>::Error>
where
    S: MessageStore,
{
    let mut delivered = Vec::new();
    for id in ids {
        let Some(metadata) = store.message_metadata(id).await? else {
            continue;
        };
        if matches!(metadata.get_bool(MSG_KEY_LOCAL), Ok(false)) {
            delivered.push(*id);
        }
    }
    Ok(delivered)
}

/// Run the manager on a message inside of a transaction, storing the message if it was accepted.
async fn deliver<S, K, V, C>(
    manager: &TransportKeyAgreementManager<S, K, V, C>,
    message: &Message,
    context: &MessageContext,
) -> Result<DeliveryState, AgreementError<S, K, V>>
where
    S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
    K: KeyManager,
    V: ClientVersioning,
    C: Clock,
{
    let store = manager.store();
    let permit = store.begin().await.map_err(ManagerError::Store)?;

    match apply(manager, message, context).await {
        Ok(DeliveryAction::AcceptDoNotShare) => {
            store.commit(permit).await.map_err(ManagerError::Store)?;
            Ok(DeliveryState::Delivered)
        }
        Ok(action) => {
            store.rollback(permit).await.map_err(ManagerError::Store)?;
            match action {
                DeliveryAction::Defer => Ok(DeliveryState::Deferred),
                _ => Ok(DeliveryState::Invalid),
            }
        }
        Err(err) => {
            store.rollback(permit).await.map_err(ManagerError::Store)?;
            Err(err)
        }
    }
}

async fn apply<S, K, V, C>(
    manager: &TransportKeyAgreementManager<S, K, V, C>,
    message: &Message,
    context: &MessageContext,
) -> Result<DeliveryAction, AgreementError<S, K, V>>
where
    S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
    K: KeyManager,
    V: ClientVersioning,
    C: Clock,
{
    let action = manager
        .incoming_message(message, &context.metadata)
        .await?;
    if action == DeliveryAction::AcceptDoNotShare {
        manager
            .store()
            .insert_message(message, &context.metadata)
            .await
            .map_err(ManagerError::Store)?;
    }
    Ok(action)
}
