// SPDX-License-Identifier: MIT OR Apache-2.0

/// Macro to run the same test logic against all store backend implementations.
///
/// This macro takes a closure that will be executed against each store type, each time inside of
/// a freshly started transaction which gets committed afterwards:
/// - In-memory store (`MemoryStore`)
/// - SQLite store (`SqliteStore`)
///
/// ## Example
///
/// ```rust
/// # use transport_agreement_core::{AuthorId, Contact, ContactId};
/// # use transport_agreement_store::{ContactStore, Transaction, assert_all_stores};
/// # async fn run() {
/// assert_all_stores!(|store| async {
///     let contact = Contact::new(ContactId::new(1), AuthorId::from_bytes([1; 32]));
///     store.insert_contact(&contact).await.unwrap();
///     assert_eq!(store.contacts().await.unwrap().len(), 1);
/// });
/// # }
/// ```
#[macro_export]
macro_rules! assert_all_stores {
    (|$store:ident| $test_body:expr) => {
        // Test with MemoryStore.
        {
            let memory_store = $crate::memory::MemoryStore::default();
            let permit = memory_store.begin().await.unwrap();
            let $store = memory_store.clone();
            $test_body.await;
            memory_store.commit(permit).await.unwrap();
        }

        // Test with SqliteStore.
        {
            let sqlite_store = $crate::sqlite::SqliteStoreBuilder::new()
                .random_memory_url()
                // We're running in a single test thread and can't have more parallel connections.
                .max_connections(1)
                .build()
                .await
                .unwrap();
            let permit = sqlite_store.begin().await.unwrap();
            let $store = sqlite_store.clone();
            $test_body.await;
            sqlite_store.commit(permit).await.unwrap();
        }
    };
}
