//! Job Executor (C8): per-job-type orchestration (spec §4.8), grounded on
//! the teacher's `engine_task` dispatch shape — generalized here to the
//! tagged union `JobPayload` instead of the teacher's per-request task
//! types.

pub mod deepdrive_build;
pub mod eval;
pub mod sim_build;

use std::sync::Arc;

use thiserror::Error;

use crate::container_runtime::{Container, ContainerRuntime};
use crate::job::{JobPayload, Results};
use crate::object_storage::ObjectStorage;
use crate::registry::Collection;
use crate::secrets::SecretDecryptor;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("supervisor error: {0}")]
    Supervisor(#[from] crate::supervisor::SupervisorError),
    #[error("secrets error: {0}")]
    Secrets(#[from] crate::secrets::SecretsError),
    #[error("container runtime error: {0}")]
    Runtime(#[from] crate::container_runtime::errors::ContainerRuntimeError),
    #[error("object storage error: {0}")]
    ObjectStorage(#[from] crate::object_storage::errors::ObjectStorageError),
}

/// Everything an executor variant needs, bundled so `run_job` constructs it
/// once per job rather than threading six parameters through every call.
pub struct ExecutorContext<'a> {
    pub runtime: &'a dyn ContainerRuntime,
    pub object_storage: &'a dyn ObjectStorage,
    pub secrets: &'a dyn Collection<crate::job::Secret>,
    pub decryptor: &'a dyn SecretDecryptor,
    pub http_client: &'a reqwest::Client,
    pub is_test: bool,
    pub results_mount_base: Arc<str>,
}

pub async fn dispatch(payload: &mut JobPayload, job_id: &str, results: &mut Results, ctx: &ExecutorContext<'_>) -> Result<(), ExecutorError> {
    match payload {
        JobPayload::Eval {
            eval_spec,
            botleague_liaison_host,
        } => eval::run(job_id, eval_spec, botleague_liaison_host, results, ctx).await,
        JobPayload::SimBuild { build } => sim_build::run(job_id, build, results, ctx).await,
        JobPayload::DeepdriveBuild { build } => deepdrive_build::run(job_id, build, results, ctx).await,
    }
}

/// Common post-setup shared by every job type (spec §4.8 "Common
/// post-setup"): for each finished container, upload its run-log and
/// populate `results.logs`/`results.errors`.
pub async fn finalize_containers(
    job_id: &str,
    containers: Vec<(Container, String)>,
    results: &mut Results,
    ctx: &ExecutorContext<'_>,
) -> Result<String, ExecutorError> {
    let mut combined_log = String::new();

    for (container, log) in containers {
        combined_log.push_str(&log);

        let short_id: String = container.id.chars().take(12).collect();
        let filename = format!("{}_job-{}.txt", image_name(&container.image), job_id);
        let url = ctx.object_storage.upload(&filename, &log).await?;
        results.logs.insert(container.id.clone(), url);

        if container.is_bad() {
            let key = format!("{}_{}", image_name(&container.image), short_id);
            let message = if container.state == crate::container_runtime::ContainerState::Dead {
                "Container is dead".to_string()
            } else {
                format!(
                    "Container failed with exit code {}",
                    container.exit_code.unwrap_or(-1)
                )
            };
            results.errors.insert(key, message);
        }
    }

    Ok(combined_log)
}

fn image_name(image: &str) -> String {
    image.split(':').next().unwrap_or(image).replace('/', "_")
}
