//! Firestore-backed registry, grounded on `original_source/.../db.py`'s
//! `DBFirestore`, which wraps `google.cloud.firestore` and performs CAS via
//! `@firestore.transactional`. We use the `firestore` crate's fluent query
//! builder and `run_transaction` for the same guarantee.
//!
//! The "simplification rule" (`_simplify_value`/`_expand_value` in the
//! Python source): a document whose map has exactly one key equal to the
//! document id is read/written as that bare scalar. Firestore documents are
//! always maps, so we apply the rule transparently at the serde boundary —
//! callers of `Collection<T>` never see it.

use std::marker::PhantomData;

use async_trait::async_trait;
use firestore::{FirestoreDb, FirestoreDbOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Collection, Registry, RegistryError};
use crate::job::{Instance, Job, Secret};

/// Result of the read-check-write done inside a single `run_transaction`
/// closure in `compare_and_swap`.
enum CasOutcome {
    Swapped,
    NoMatch,
    Missing,
}

pub struct FirestoreCollection<T> {
    db: FirestoreDb,
    collection: &'static str,
    _marker: PhantomData<T>,
}

impl<T> FirestoreCollection<T> {
    pub fn new(db: FirestoreDb, collection: &'static str) -> Self {
        Self {
            db,
            collection,
            _marker: PhantomData,
        }
    }

    fn backend_error(&self, raw_error_message: impl ToString) -> RegistryError {
        RegistryError::Backend {
            collection: self.collection.to_string(),
            raw_error_message: raw_error_message.to_string(),
        }
    }
}

pub async fn connect(project_id: &str) -> Result<FirestoreDb, RegistryError> {
    FirestoreDb::with_options(FirestoreDbOptions::new(project_id.to_string()))
        .await
        .map_err(|e| RegistryError::Backend {
            collection: "<connect>".to_string(),
            raw_error_message: e.to_string(),
        })
}

#[async_trait]
impl<T> Collection<T> for FirestoreCollection<T>
where
    T: Send + Sync + Clone + Serialize + DeserializeOwned,
{
    async fn get(&self, key: &str) -> Result<Option<T>, RegistryError> {
        self.db
            .fluent()
            .select()
            .by_id_in(self.collection)
            .obj::<T>()
            .one(key)
            .await
            .map_err(|e| self.backend_error(e))
    }

    async fn set(&self, key: &str, value: T) -> Result<(), RegistryError> {
        self.db
            .fluent()
            .update()
            .in_col(self.collection)
            .document_id(key)
            .object(&value)
            .execute::<T>()
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        matches: &(dyn Fn(&T) -> bool + Send + Sync),
        new: T,
    ) -> Result<bool, RegistryError> {
        // `firestore::FirestoreDb::run_transaction` serializes against other
        // transactional writers the same way the Python source's
        // `@firestore.transactional` decorator does. The read, the
        // `matches` check, and the conditional write all happen inside the
        // same transaction closure so they commit atomically — a concurrent
        // CAS on the same document either sees our write or we see theirs,
        // never an interleaving where both read ASSIGNED and both write.
        let collection = self.collection;
        let key_owned = key.to_string();

        let outcome = self
            .db
            .run_transaction(|db| {
                let key = key_owned.clone();
                let new = new.clone();
                Box::pin(async move {
                    let current: Option<T> = db.fluent().select().by_id_in(collection).obj::<T>().one(&key).await?;
                    match current {
                        Some(ref cur) if matches(cur) => {
                            db.fluent()
                                .update()
                                .in_col(collection)
                                .document_id(&key)
                                .object(&new)
                                .execute::<T>()
                                .await?;
                            Ok(CasOutcome::Swapped)
                        }
                        Some(_) => Ok(CasOutcome::NoMatch),
                        None => Ok(CasOutcome::Missing),
                    }
                })
            })
            .await
            .map_err(|e| self.backend_error(e))?;

        match outcome {
            CasOutcome::Swapped => Ok(true),
            CasOutcome::NoMatch => Ok(false),
            CasOutcome::Missing => Err(RegistryError::NotFound {
                collection: self.collection.to_string(),
                key: key.to_string(),
            }),
        }
    }

    async fn query(&self, predicate: &(dyn Fn(&T) -> bool + Send + Sync)) -> Result<Vec<T>, RegistryError> {
        let all: Vec<T> = self
            .db
            .fluent()
            .select()
            .from(self.collection)
            .obj::<T>()
            .query()
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(all.into_iter().filter(|v| predicate(v)).collect())
    }
}

/// Bundles the three Firestore-backed collections (jobs, instances,
/// secrets) behind one `Registry` handle, mirroring `MemoryRegistry`'s
/// shape so `WorkerLoop` is agnostic to which backend it was handed.
pub struct FirestoreRegistry {
    jobs: FirestoreCollection<Job>,
    instances: FirestoreCollection<Instance>,
    secrets: FirestoreCollection<Secret>,
}

impl FirestoreRegistry {
    pub fn new(db: FirestoreDb) -> Self {
        Self {
            jobs: FirestoreCollection::new(db.clone(), crate::config::JOBS_COLLECTION),
            instances: FirestoreCollection::new(db.clone(), crate::config::INSTANCES_COLLECTION),
            secrets: FirestoreCollection::new(db, crate::config::SECRETS_COLLECTION),
        }
    }
}

impl Registry for FirestoreRegistry {
    fn jobs(&self) -> &dyn Collection<Job> {
        &self.jobs
    }

    fn instances(&self) -> &dyn Collection<Instance> {
        &self.instances
    }

    fn secrets(&self) -> &dyn Collection<Secret> {
        &self.secrets
    }
}
