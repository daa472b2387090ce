//! Worker Loop (C9): the long-lived control loop (spec §4.1), grounded on
//! the teacher's `engine_task::Task` trait and `original_source/worker.py`'s
//! `loop`/`run_job` functions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

use crate::auto_update::AutoUpdater;
use crate::config::WorkerConfig;
use crate::container_runtime::ContainerRuntime;
use crate::engine_task::Task;
use crate::executor::{self, ExecutorContext};
use crate::job::{InstanceStatus, Job, JobStatus};
use crate::logging::ErrorSink;
use crate::object_storage::ObjectStorage;
use crate::registry::Registry;
use crate::secrets::SecretDecryptor;

const ITERATION_SLEEP_BASE: Duration = Duration::from_millis(500);
const ITERATION_SLEEP_JITTER_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// spec §7 "Invariant breach (>1 job per instance)": fatal, expected to
    /// crash the process.
    #[error("invariant violation: instance `{instance_id}` has {count} ASSIGNED jobs, at most one is tolerated")]
    MultipleAssignedJobs { instance_id: String, count: usize },
    #[error("registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),
    /// spec §7 "CAS lost (status transition)": fatal for this iteration,
    /// not for the process.
    #[error("lost the claim CAS on job `{job_id}`: another worker owns it")]
    CasLost { job_id: String },
}

pub struct WorkerLoop<A> {
    instance_id: String,
    is_test: bool,
    results_mount_base: Arc<str>,
    registry: Arc<dyn Registry>,
    runtime: Arc<dyn ContainerRuntime>,
    object_storage: Arc<dyn ObjectStorage>,
    secrets_decryptor: Arc<dyn SecretDecryptor>,
    http_client: reqwest::Client,
    auto_updater: A,
    logged_in: bool,
    created_at: DateTime<Utc>,
}

impl<A: AutoUpdater> WorkerLoop<A> {
    pub fn new(
        config: &WorkerConfig,
        registry: Arc<dyn Registry>,
        runtime: Arc<dyn ContainerRuntime>,
        object_storage: Arc<dyn ObjectStorage>,
        secrets_decryptor: Arc<dyn SecretDecryptor>,
        auto_updater: A,
    ) -> Self {
        Self {
            instance_id: config.instance_id.clone(),
            is_test: config.is_test,
            results_mount_base: Arc::from(config.results_mount_base.as_str()),
            registry,
            runtime,
            object_storage,
            secrets_decryptor,
            http_client: reqwest::Client::new(),
            auto_updater,
            logged_in: false,
            created_at: Utc::now(),
        }
    }

    /// Runs until the auto-updater signals, or `max_iters` iterations
    /// complete (test hook per spec §4.1). Returns the last processed job.
    pub async fn run_loop(&mut self, max_iters: Option<u64>) -> Result<Option<Job>, WorkerError> {
        let mut last_job = None;
        let mut iterations = 0u64;

        loop {
            if let Some(max) = max_iters {
                if iterations >= max {
                    break;
                }
            }
            iterations += 1;

            self.prune_dangling_state().await;

            if self.auto_updater.is_update_available().await {
                info!("auto-updater signaled a newer revision is live, returning from loop");
                break;
            }

            self.stop_orphan_containers().await;

            let assigned = self
                .registry
                .jobs()
                .query(&|j: &Job| j.instance_id == self.instance_id && j.status == JobStatus::Assigned)
                .await?;

            if assigned.len() > 1 {
                return Err(WorkerError::MultipleAssignedJobs {
                    instance_id: self.instance_id.clone(),
                    count: assigned.len(),
                });
            }

            if let Some(job) = assigned.into_iter().next() {
                match self.run_job(job).await {
                    Ok(finished) => last_job = Some(finished),
                    Err(WorkerError::CasLost { job_id }) => {
                        warn!("lost claim CAS for job `{job_id}`, abandoning this iteration");
                    }
                    Err(e) => return Err(e),
                }
            }

            let jitter_ms: u64 = rand::rng().random_range(0..=ITERATION_SLEEP_JITTER_MS);
            tokio::time::sleep(ITERATION_SLEEP_BASE + Duration::from_millis(jitter_ms)).await;
        }

        Ok(last_job)
    }

    /// Claims `job`, dispatches it to the appropriate executor, captures
    /// any escaping error, releases the instance, and marks FINISHED
    /// (spec §4.1 `run_job`). Every exit path — success or escaped error —
    /// reaches FINISHED except CAS loss at claim time.
    async fn run_job(&mut self, mut job: Job) -> Result<Job, WorkerError> {
        if !self.logged_in {
            // Registry login happens once per process, lazily on first job
            // (spec §4.1: "Log in to the container registry once per
            // process (idempotent)"). Missing credentials are tolerated —
            // many job types never need a private pull.
            if let Err(e) = self.login_to_container_registry().await {
                warn!("container registry login skipped: {e}");
            }
            self.logged_in = true;
        }

        let job_id = job.id.clone();
        let claimed = self
            .registry
            .jobs()
            .compare_and_swap(
                &job_id,
                &|j: &Job| j.status == JobStatus::Assigned,
                Job {
                    status: JobStatus::Running,
                    started_at: Some(chrono::Utc::now()),
                    ..job.clone()
                },
            )
            .await?;
        if !claimed {
            return Err(WorkerError::CasLost { job_id });
        }
        job.status = JobStatus::Running;
        job.started_at = Some(chrono::Utc::now());
        job.results = crate::job::Results::empty();

        let error_sink = ErrorSink::new();
        let secrets_ref = self.registry.secrets();
        let decryptor_ref = self.secrets_decryptor.as_ref();
        let ctx = ExecutorContext {
            runtime: self.runtime.as_ref(),
            object_storage: self.object_storage.as_ref(),
            secrets: secrets_ref,
            decryptor: decryptor_ref,
            http_client: &self.http_client,
            is_test: self.is_test,
            results_mount_base: self.results_mount_base.clone(),
        };

        let mut payload = job.payload.clone();
        if let Err(e) = executor::dispatch(&mut payload, &job.id, &mut job.results, &ctx).await {
            error_sink.record(&e.to_string());
            job.worker_error = Some(error_sink.contents());
        }
        job.payload = payload;

        self.release_instance(&job.instance_id).await?;

        job.status = JobStatus::Finished;
        job.finished_at = Some(chrono::Utc::now());
        self.registry.jobs().set(&job.id, job.clone()).await?;

        Ok(job)
    }

    /// Spec §4.9: idempotent USED → AVAILABLE transition.
    async fn release_instance(&self, instance_id: &str) -> Result<(), WorkerError> {
        let instances = self.registry.instances();
        let Some(instance) = instances.get(instance_id).await? else {
            warn!("instance `{instance_id}` not found at release time, skipping");
            return Ok(());
        };
        if instance.status == InstanceStatus::Available {
            warn!("instance `{instance_id}` already AVAILABLE, skipping");
            return Ok(());
        }
        instances
            .set(
                instance_id,
                crate::job::Instance {
                    status: InstanceStatus::Available,
                    time_last_available: Some(chrono::Utc::now()),
                    ..instance
                },
            )
            .await?;
        Ok(())
    }

    /// Spec §4.1 step 3: stop any stray "botleague" container that survived
    /// a previous run, identified by the image-name allow-list (§6).
    async fn stop_orphan_containers(&self) {
        let Ok(running) = self.runtime.list_running().await else {
            return;
        };
        for container in running {
            if is_orphan_image(&container.image) {
                warn!("stopping orphan container `{}` (image `{}`)", container.id, container.image);
                let _ = self.runtime.stop(&container.id, 1).await;
            }
        }
    }

    /// Spec §4.1 step 1: opportunistic housekeeping. The adapter trait
    /// (spec §4.3) doesn't expose a dangling-image prune primitive, so this
    /// is folded into `stop_orphan_containers` — stopping orphans removes
    /// them (see `BollardRuntime::stop`), which is the only "dangling
    /// state" this worker itself accumulates.
    async fn prune_dangling_state(&self) {
        debug!("housekeeping pass (orphan containers are reaped by stop_orphan_containers)");
    }

    /// Best-effort registry login using the same named secrets the build
    /// executors decrypt (spec §4.3: "called once per process before any
    /// private-registry pull").
    async fn login_to_container_registry(&self) -> Result<(), WorkerError> {
        let creds = crate::secrets::resolve_build_credentials(self.registry.secrets(), self.secrets_decryptor.as_ref())
            .await
            .map_err(|e| WorkerError::Registry(crate::registry::RegistryError::Backend {
                collection: crate::config::SECRETS_COLLECTION.to_string(),
                raw_error_message: e.to_string(),
            }))?;
        self.runtime
            .login(&creds.registry_user, &creds.registry_pass)
            .await
            .map_err(|e| WorkerError::Registry(crate::registry::RegistryError::Backend {
                collection: "<container registry>".to_string(),
                raw_error_message: e.to_string(),
            }))
    }
}

impl<A: AutoUpdater> Task for WorkerLoop<A> {
    fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    fn id(&self) -> &str {
        &self.instance_id
    }

    /// Drives `run_loop` to completion on a dedicated current-thread
    /// runtime, mirroring the teacher's `Task::run` entry point — this
    /// worker has exactly one long-lived task per process rather than one
    /// per inbound request (SPEC_FULL.md §4.1–4.9).
    fn run(&mut self) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!("could not build tokio runtime: {e}");
                return;
            }
        };
        if let Err(e) = runtime.block_on(self.run_loop(None)) {
            error!("worker loop exited with a fatal error: {e}");
        }
    }

    /// Spec §5 "Cancellation": there is no mid-job cancellation contract.
    fn cancel(&self) -> bool {
        false
    }
}

fn is_orphan_image(image: &str) -> bool {
    crate::config::ORPHAN_IMAGE_PREFIXES.iter().any(|p| image.starts_with(p))
        || crate::config::ORPHAN_IMAGE_EXACT.iter().any(|e| image == *e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_orphan_image_matches_prefix_allow_list() {
        assert!(is_orphan_image("deepdriveio/deepdrive:problem_domain_randomization"));
        assert!(is_orphan_image("deepdriveio/deepdrive:bot_some_bot"));
        assert!(is_orphan_image("deepdriveio/private:deepdrive-sim-package"));
        assert!(!is_orphan_image("unrelated/image:latest"));
    }
}
