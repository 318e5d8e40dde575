// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

/// Trait defining a store API for handling ready and pending dependencies backing causal
/// ordering implementations.
///
/// An implementation of this store trait provides the following functionality:
///
/// - Maintain a set of all items which were processed and can be depended on
/// - Maintain a list of items which don't have their dependencies met
/// - Return all pending items which depend on a given item
///
/// Unlike the domain stores this bookkeeping is not transactional.
pub trait OrdererStore<T> {
    type Error;

    /// Add an item which has all it's dependencies met. Returns `false` if it was already ready.
    fn mark_ready(&self, key: T) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Add an item which does not have all it's dependencies met yet.
    fn mark_pending(
        &self,
        key: T,
        dependencies: Vec<T>,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Get all pending items which directly depend on the given key.
    fn get_next_pending(
        &self,
        key: T,
    ) -> impl Future<Output = Result<Option<HashSet<(T, Vec<T>)>>, Self::Error>>;

    /// Remove all items from the pending queue which depend on the passed key.
    fn remove_pending(&self, key: T) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Returns `true` if all the passed keys are present in the ready set.
    fn ready(&self, keys: &[T]) -> impl Future<Output = Result<bool, Self::Error>>;
}
