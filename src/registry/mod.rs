//! Job Registry Client (C2).
//!
//! Exposes `get`/`set`/`compare_and_swap`/`query` over a remote key-value
//! collection, grounded on `original_source/.../db.py`'s `DB` base class and
//! its two concrete implementations, `DBFirestore` (transactional CAS via
//! `@firestore.transactional`) and `DBLocal` (a plain dict, non-atomic,
//! dev-only). We mirror that split as a `Registry` trait with a Firestore
//! backend and an in-memory backend, selected by `WorkerConfig::use_remote_registry`.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Instance, Job, Secret};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry backend error on collection `{collection}`: {raw_error_message}")]
    Backend {
        collection: String,
        raw_error_message: String,
    },
    #[error("no document `{key}` in collection `{collection}`")]
    NotFound { collection: String, key: String },
    #[error("compare-and-swap lost for `{key}` in collection `{collection}`: another writer holds it")]
    CasLost { collection: String, key: String },
}

/// A single logical collection (jobs, instances, or secrets), keyed by
/// unique string id. Implementations MUST make `compare_and_swap` atomic
/// against concurrent writers (spec §4.2).
#[async_trait]
pub trait Collection<T>: Send + Sync
where
    T: Send + Sync + Clone,
{
    async fn get(&self, key: &str) -> Result<Option<T>, RegistryError>;
    async fn set(&self, key: &str, value: T) -> Result<(), RegistryError>;
    /// Atomically replaces the document at `key` with `new` iff its current
    /// value equals `expected` under the predicate `matches`. Returns
    /// `false` (no error) when the CAS lost to a concurrent writer — the
    /// caller decides whether that's fatal.
    async fn compare_and_swap(
        &self,
        key: &str,
        matches: &(dyn Fn(&T) -> bool + Send + Sync),
        new: T,
    ) -> Result<bool, RegistryError>;
    async fn query(&self, predicate: &(dyn Fn(&T) -> bool + Send + Sync)) -> Result<Vec<T>, RegistryError>;
}

/// The three collections the worker talks to, bundled behind one handle so
/// `WorkerLoop` doesn't need to know which backend is live.
pub trait Registry: Send + Sync {
    fn jobs(&self) -> &dyn Collection<Job>;
    fn instances(&self) -> &dyn Collection<Instance>;
    fn secrets(&self) -> &dyn Collection<Secret>;
}
