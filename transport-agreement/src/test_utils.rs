// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the manager's collaborators and a harness simulating peers which exchange
//! messages.
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use transport_agreement_core::{
    AuthorId, ClientId, Contact, ContactId, Dictionary, KeySetId, Message, MessageId, TransportId,
    Visibility,
};
use transport_agreement_store::memory::MemoryStore;
use transport_agreement_store::{
    ContactStore, MessageStore, Transaction, TransportKeySet, TransportKeyStore,
};

use crate::config::Config;
use crate::crypto::{RootKey, Rng};
use crate::delivery::{Delivery, DeliveryState};
use crate::manager::{AgreementError, TransportKeyAgreementManager};
use crate::message::MSG_KEY_LOCAL;
use crate::session::Session;
use crate::traits::{ClientVersioning, Clock, KeyManager};

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Arguments of a call to [`KeyManager::add_rotation_keys`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledKeys {
    pub contact_id: ContactId,
    pub transport_id: TransportId,
    pub root_key: RootKey,
    pub epoch: u64,
    pub alice: bool,
    pub active: bool,
    pub key_set_id: KeySetId,
}

/// Key manager recording key sets in the store and every root key it was handed.
///
/// Calls are recorded even when the surrounding transaction gets rolled back later.
#[derive(Clone, Debug)]
pub struct TestKeyManager<S> {
    store: S,
    installed: Arc<Mutex<Vec<InstalledKeys>>>,
}

impl<S> TestKeyManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            installed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn installed(&self) -> Vec<InstalledKeys> {
        self.installed.lock().unwrap().clone()
    }
}

impl<S> KeyManager for TestKeyManager<S>
where
    S: TransportKeyStore,
{
    type Error = S::Error;

    async fn add_rotation_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        root_key: &RootKey,
        epoch: u64,
        alice: bool,
        active: bool,
    ) -> Result<KeySetId, Self::Error> {
        let key_set_id = self
            .store
            .insert_transport_keys(contact_id, transport_id, epoch, alice, active)
            .await?;
        self.installed.lock().unwrap().push(InstalledKeys {
            contact_id,
            transport_id: transport_id.clone(),
            root_key: root_key.clone(),
            epoch,
            alice,
            active,
            key_set_id,
        });
        Ok(key_set_id)
    }

    async fn activate_keys(
        &self,
        keys: &HashMap<TransportId, KeySetId>,
    ) -> Result<(), Self::Error> {
        for (transport_id, key_set_id) in keys {
            self.store
                .set_transport_keys_active(transport_id, *key_set_id)
                .await?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct TestVersioning {
    visibility: Visibility,
}

impl TestVersioning {
    pub fn new(visibility: Visibility) -> Self {
        Self { visibility }
    }
}

impl Default for TestVersioning {
    fn default() -> Self {
        Self::new(Visibility::Shared)
    }
}

impl ClientVersioning for TestVersioning {
    type Error = Infallible;

    async fn client_visibility(
        &self,
        _contact_id: ContactId,
        _client_id: &ClientId,
        _major_version: u32,
    ) -> Result<Visibility, Self::Error> {
        Ok(self.visibility)
    }
}

/// Manually advanced clock.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicU64>);

impl TestClock {
    pub fn new(now: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now)))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub type TestManager =
    TransportKeyAgreementManager<MemoryStore, TestKeyManager<MemoryStore>, TestVersioning, TestClock>;

pub type TestError = AgreementError<MemoryStore, TestKeyManager<MemoryStore>, TestVersioning>;

/// A peer with its own store, clock and delivery queue.
#[derive(Debug)]
pub struct TestPeer {
    pub author: AuthorId,
    pub store: MemoryStore,
    pub key_manager: TestKeyManager<MemoryStore>,
    pub clock: TestClock,
    pub manager: TestManager,
    pub delivery: Delivery,
    seed: u8,
    restarts: u8,
}

impl TestPeer {
    /// Create a peer supporting the given duplex transports and open its database.
    pub async fn new(seed: u8, transports: &[&str]) -> Self {
        let author = AuthorId::from_bytes([seed; 32]);
        let store = MemoryStore::new();
        let key_manager = TestKeyManager::new(store.clone());
        let clock = TestClock::new(1_000 * seed as u64);
        let manager = TransportKeyAgreementManager::new_with_rng(
            config(author, transports),
            store.clone(),
            key_manager.clone(),
            TestVersioning::default(),
            clock.clone(),
            Rng::from_seed([seed; 32]),
        );

        let peer = Self {
            author,
            store,
            key_manager,
            clock,
            manager,
            delivery: Delivery::new(),
            seed,
            restarts: 0,
        };
        peer.start().await.unwrap();
        peer
    }

    /// Replace the manager as if the application restarted with other transports.
    ///
    /// The database is not opened again, see [`TestPeer::start`].
    pub fn restart(&mut self, transports: &[&str]) {
        self.restarts += 1;
        self.manager = TransportKeyAgreementManager::new_with_rng(
            config(self.author, transports),
            self.store.clone(),
            self.key_manager.clone(),
            TestVersioning::default(),
            self.clock.clone(),
            Rng::from_seed([self.seed.wrapping_add(self.restarts.wrapping_mul(16)); 32]),
        );
    }

    pub async fn start(&self) -> Result<(), TestError> {
        self.transaction(async || self.manager.on_database_opened().await)
            .await
    }

    /// Add another peer as contact.
    pub async fn add_contact(&self, other: &TestPeer, id: u32) -> Contact {
        self.add_contact_with_keys(other, id, &[]).await
    }

    /// Add another peer as contact for which keys of the given transports are already known.
    pub async fn add_contact_with_keys(
        &self,
        other: &TestPeer,
        id: u32,
        transports: &[&str],
    ) -> Contact {
        let contact = Contact::new(ContactId::new(id), other.author);
        let alice = self.author < other.author;
        self.transaction(async || {
            self.store.insert_contact(&contact).await.unwrap();
            for transport in transports {
                self.store
                    .insert_transport_keys(contact.id(), &transport_id(transport), 0, alice, true)
                    .await
                    .unwrap();
            }
            self.manager.adding_contact(&contact).await
        })
        .await
        .unwrap();
        contact
    }

    /// Messages this peer sent to a contact, in the order they were sent.
    pub async fn outgoing(&self, contact: &Contact) -> Vec<Message> {
        let group_id = self.manager.contact_group(contact).id();
        let mut query = Dictionary::new();
        query.insert_bool(MSG_KEY_LOCAL, true);

        let permit = self.store.begin().await.unwrap();
        let mut messages = Vec::new();
        for id in self.store.message_ids(&group_id, &query).await.unwrap() {
            messages.push(self.store.message(&id).await.unwrap().unwrap());
        }
        self.store.commit(permit).await.unwrap();
        messages
    }

    /// Deliver a single message to this peer.
    pub async fn receive(&mut self, message: Message) -> Result<DeliveryState, TestError> {
        self.delivery.receive(&self.manager, message).await
    }

    /// Deliver everything `from` ever sent to its contact to this peer. Messages this peer
    /// already received are skipped by the delivery queue.
    pub async fn sync_from(
        &mut self,
        from: &TestPeer,
        contact: &Contact,
    ) -> Vec<(MessageId, DeliveryState)> {
        let mut states = Vec::new();
        for message in from.outgoing(contact).await {
            let id = message.id();
            let state = self.receive(message).await.unwrap();
            states.push((id, state));
        }
        states
    }

    pub async fn retry_deferred(&mut self) -> Result<Vec<(MessageId, DeliveryState)>, TestError> {
        self.delivery.retry_deferred(&self.manager).await
    }

    pub async fn sessions(&self, contact: &Contact) -> Vec<(TransportId, Session)> {
        self.transaction(async || self.manager.sessions(contact).await)
            .await
            .unwrap()
    }

    pub async fn key_set(&self, key_set_id: KeySetId) -> Option<TransportKeySet> {
        let permit = self.store.begin().await.unwrap();
        let key_set = self.store.transport_keys(key_set_id).await.unwrap();
        self.store.commit(permit).await.unwrap();
        key_set
    }

    /// Run the given work in a transaction, rolling back on errors.
    pub async fn transaction<T, F>(&self, work: F) -> Result<T, TestError>
    where
        F: AsyncFnOnce() -> Result<T, TestError>,
    {
        let permit = self.store.begin().await.unwrap();
        match work().await {
            Ok(value) => {
                self.store.commit(permit).await.unwrap();
                Ok(value)
            }
            Err(err) => {
                self.store.rollback(permit).await.unwrap();
                Err(err)
            }
        }
    }
}

pub fn transport_id(value: &str) -> TransportId {
    TransportId::new(value).unwrap()
}

fn config(author: AuthorId, transports: &[&str]) -> Config {
    transports
        .iter()
        .fold(Config::new(author), |config, transport| {
            config.duplex_transport(transport_id(transport))
        })
}
