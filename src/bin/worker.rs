//! Process entry point: wires the concrete C1-C9 implementations together
//! and drives the worker loop to completion (spec §1, §4.1).
//!
//! Exit code 0 always signals "restart me with new code" (spec §6) — the
//! process supervisor that owns restarts is out of scope (spec §1), so
//! `main` simply returns `Ok(())` on a clean loop exit and propagates any
//! fatal error (CAS-loss is handled inside the loop; only an invariant
//! breach or a backend outage reaches here).

use std::sync::Arc;

use botleague_worker::auto_update::NeverUpdater;
use botleague_worker::config::{self, WorkerConfig};
use botleague_worker::container_runtime::{BollardRuntime, ContainerRuntime};
use botleague_worker::logging;
use botleague_worker::object_storage::google_object_storage::GoogleOS;
use botleague_worker::object_storage::ObjectStorage;
use botleague_worker::registry::firestore::FirestoreRegistry;
use botleague_worker::registry::memory::MemoryRegistry;
use botleague_worker::registry::Registry;
use botleague_worker::secrets::{PlaintextSecretDecryptor, SecretDecryptor};
use botleague_worker::worker::WorkerLoop;

#[macro_use]
extern crate tracing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cfg = WorkerConfig::from_env()?;
    info!(instance_id = %cfg.instance_id, is_test = cfg.is_test, "starting botleague-worker");

    let registry: Arc<dyn Registry> = if cfg.use_remote_registry() {
        let project_id = cfg
            .gcp_project
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_CLOUD_PROJECT or GCP_PROJECT must be set to use Firestore"))?;
        let db = botleague_worker::registry::firestore::connect(&project_id).await?;
        Arc::new(FirestoreRegistry::new(db))
    } else {
        info!("using in-memory registry (SHOULD_USE_FIRESTORE=false or IS_TEST without FORCE_FIRESTORE_DB)");
        Arc::new(MemoryRegistry::new())
    };

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(BollardRuntime::connect()?);
    let object_storage: Arc<dyn ObjectStorage> =
        Arc::new(GoogleOS::new(config::LOG_BUCKET, config::LOG_BUCKET_PREFIX).await?);
    let secrets_decryptor: Arc<dyn SecretDecryptor> = Arc::new(PlaintextSecretDecryptor);

    // The real auto-updater is an out-of-scope sidecar process that `git
    // pull`s a production branch (spec §1, §9); this binary only needs to
    // observe its signal. `NeverUpdater` is the hook point — swap in a
    // `PollingAutoUpdater` backed by a version-file check once that sidecar
    // exists in this deployment.
    let mut worker = WorkerLoop::new(&cfg, registry, runtime, object_storage, secrets_decryptor, NeverUpdater);

    worker.run_loop(None).await?;

    info!("worker loop returned, exiting for restart");
    Ok(())
}
