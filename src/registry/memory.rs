//! In-memory registry backend, grounded on `original_source/.../db.py`'s
//! `DBLocal`: a plain dict guarded by a lock, required by spec §4.2 for
//! tests and selected whenever `WorkerConfig::use_remote_registry()` is
//! false.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Collection, Registry, RegistryError};
use crate::job::{Instance, Job, Secret};

pub struct MemoryCollection<T> {
    name: String,
    store: Mutex<HashMap<String, T>>,
}

impl<T: Clone> MemoryCollection<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed(&self, key: impl Into<String>, value: T) {
        self.store.lock().expect("memory collection mutex poisoned").insert(key.into(), value);
    }
}

#[async_trait]
impl<T> Collection<T> for MemoryCollection<T>
where
    T: Send + Sync + Clone,
{
    async fn get(&self, key: &str) -> Result<Option<T>, RegistryError> {
        Ok(self.store.lock().expect("memory collection mutex poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: T) -> Result<(), RegistryError> {
        self.store
            .lock()
            .expect("memory collection mutex poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        matches: &(dyn Fn(&T) -> bool + Send + Sync),
        new: T,
    ) -> Result<bool, RegistryError> {
        let mut store = self.store.lock().expect("memory collection mutex poisoned");
        match store.get(key) {
            Some(current) if matches(current) => {
                store.insert(key.to_string(), new);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RegistryError::NotFound {
                collection: self.name.clone(),
                key: key.to_string(),
            }),
        }
    }

    async fn query(&self, predicate: &(dyn Fn(&T) -> bool + Send + Sync)) -> Result<Vec<T>, RegistryError> {
        Ok(self
            .store
            .lock()
            .expect("memory collection mutex poisoned")
            .values()
            .filter(|v| predicate(v))
            .cloned()
            .collect())
    }
}

pub struct MemoryRegistry {
    jobs: MemoryCollection<Job>,
    instances: MemoryCollection<Instance>,
    secrets: MemoryCollection<Secret>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            jobs: MemoryCollection::new(crate::config::JOBS_COLLECTION),
            instances: MemoryCollection::new(crate::config::INSTANCES_COLLECTION),
            secrets: MemoryCollection::new(crate::config::SECRETS_COLLECTION),
        }
    }

    pub fn seed_job(&self, job: Job) {
        self.jobs.seed(job.id.clone(), job);
    }

    pub fn seed_instance(&self, instance: Instance) {
        self.instances.seed(instance.id.clone(), instance);
    }

    pub fn seed_secret(&self, secret: Secret) {
        self.secrets.seed(secret.name.clone(), secret);
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for MemoryRegistry {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InstanceStatus, JobStatus};

    fn fake_instance(id: &str) -> Instance {
        Instance {
            id: id.to_string(),
            status: InstanceStatus::Used,
            time_last_available: None,
        }
    }

    #[tokio::test]
    async fn compare_and_swap_succeeds_once_for_concurrent_claimants() {
        let registry = MemoryRegistry::new();
        registry.seed_instance(fake_instance("vm-1"));

        let first = registry
            .instances()
            .compare_and_swap(
                "vm-1",
                &|i: &Instance| i.status == InstanceStatus::Used,
                Instance {
                    status: InstanceStatus::Available,
                    time_last_available: None,
                    ..fake_instance("vm-1")
                },
            )
            .await
            .unwrap();
        assert!(first);

        let second = registry
            .instances()
            .compare_and_swap(
                "vm-1",
                &|i: &Instance| i.status == InstanceStatus::Used,
                fake_instance("vm-1"),
            )
            .await
            .unwrap();
        assert!(!second, "second CAS must lose: instance is already AVAILABLE");
    }

    #[tokio::test]
    async fn query_filters_by_predicate() {
        let registry = MemoryRegistry::new();
        registry.seed_job(crate::job::Job {
            id: "a".into(),
            instance_id: "vm-1".into(),
            status: JobStatus::Assigned,
            started_at: None,
            finished_at: None,
            results: Default::default(),
            worker_error: None,
            payload: crate::job::JobPayload::SimBuild {
                build: crate::job::BuildSpec {
                    commit: "deadbeef".into(),
                    branch: "main".into(),
                    build_id: "b1".into(),
                },
            },
        });
        let found = registry
            .jobs()
            .query(&|j: &Job| j.instance_id == "vm-1" && j.status == JobStatus::Assigned)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
