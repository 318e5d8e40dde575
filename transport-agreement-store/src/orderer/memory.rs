// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::hash::Hash as StdHash;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::orderer::OrdererStore;

#[derive(Debug)]
struct Inner<ID> {
    ready: HashSet<ID>,
    pending: HashMap<ID, HashSet<(ID, Vec<ID>)>>,
}

/// In-memory implementation of [`OrdererStore`].
#[derive(Clone, Debug)]
pub struct OrdererMemoryStore<ID> {
    inner: Arc<Mutex<Inner<ID>>>,
}

impl<ID> OrdererMemoryStore<ID> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ready: HashSet::new(),
                pending: HashMap::new(),
            })),
        }
    }

    #[cfg(any(test, feature = "test_utils"))]
    pub async fn ready_len(&self) -> usize {
        self.inner.lock().await.ready.len()
    }

    /// Number of distinct dependencies other items are waiting for.
    #[cfg(any(test, feature = "test_utils"))]
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

impl<ID> Default for OrdererMemoryStore<ID> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ID> OrdererStore<ID> for OrdererMemoryStore<ID>
where
    ID: Clone + Eq + StdHash,
{
    type Error = Infallible;

    async fn mark_ready(&self, key: ID) -> Result<bool, Infallible> {
        Ok(self.inner.lock().await.ready.insert(key))
    }

    async fn mark_pending(&self, key: ID, dependencies: Vec<ID>) -> Result<bool, Infallible> {
        let mut inner = self.inner.lock().await;
        let mut insert_occured = false;

        // The item is registered under every dependency which is not ready yet:
        //
        // pending[dep] = (key, [all dependencies of key])
        for dep_key in &dependencies {
            if inner.ready.contains(dep_key) {
                continue;
            }

            let dependents = inner.pending.entry(dep_key.clone()).or_default();
            if dependents.insert((key.clone(), dependencies.clone())) {
                insert_occured = true;
            }
        }

        Ok(insert_occured)
    }

    async fn get_next_pending(
        &self,
        key: ID,
    ) -> Result<Option<HashSet<(ID, Vec<ID>)>>, Infallible> {
        Ok(self.inner.lock().await.pending.get(&key).cloned())
    }

    async fn remove_pending(&self, key: ID) -> Result<bool, Infallible> {
        Ok(self.inner.lock().await.pending.remove(&key).is_some())
    }

    async fn ready(&self, dependencies: &[ID]) -> Result<bool, Infallible> {
        let inner = self.inner.lock().await;
        Ok(dependencies.iter().all(|dep| inner.ready.contains(dep)))
    }
}
