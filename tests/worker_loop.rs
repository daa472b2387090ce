//! Integration tests exercising the full worker loop (spec.md §8 seed
//! scenarios S1, S3, S5, S6) against the in-memory registry, the fake
//! container runtime, and an in-memory object store — no live Docker
//! daemon or GCP credentials required.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use botleague_worker::auto_update::{AutoUpdater, NeverUpdater};
use botleague_worker::config::WorkerConfig;
use botleague_worker::container_runtime::fake::{FakeContainerRuntime, ScriptedContainer};
use botleague_worker::container_runtime::ContainerRuntime;
use botleague_worker::job::{
    BuildSpec, EvalSpec, Instance, InstanceStatus, Job, JobPayload, JobStatus,
};
use botleague_worker::object_storage::memory::MemoryObjectStorage;
use botleague_worker::object_storage::ObjectStorage;
use botleague_worker::registry::memory::MemoryRegistry;
use botleague_worker::registry::Registry;
use botleague_worker::secrets::{PlaintextSecretDecryptor, SecretDecryptor};
use botleague_worker::worker::WorkerLoop;

const INSTANCE_ID: &str = "9999999999999999999";

fn test_config() -> WorkerConfig {
    WorkerConfig {
        instance_id: INSTANCE_ID.to_string(),
        is_test: true,
        force_firestore_db: false,
        should_use_firestore: false,
        gcp_project: None,
        results_mount_base: std::env::temp_dir().join("botleague_worker_tests").to_string_lossy().to_string(),
    }
}

fn eval_job(eval_id: &str, liaison_host: &str) -> Job {
    Job {
        id: format!("TEST_JOB_{eval_id}"),
        instance_id: INSTANCE_ID.to_string(),
        status: JobStatus::Assigned,
        started_at: None,
        finished_at: None,
        results: Default::default(),
        worker_error: None,
        payload: JobPayload::Eval {
            eval_spec: EvalSpec {
                docker_tag: "deepdriveio/deepdrive:bot_domain_randomization".to_string(),
                eval_id: eval_id.to_string(),
                eval_key: "fake".to_string(),
                seed: 1,
                problem: "domain_randomization".to_string(),
                problem_def: None,
                full_eval_request: None,
                run_problem_only: false,
            },
            botleague_liaison_host: liaison_host.to_string(),
        },
    }
}

fn scripted(log_lines: &[&str], exit_code: i64, dead: bool) -> ScriptedContainer {
    ScriptedContainer {
        log_lines: log_lines.iter().map(|s| s.to_string()).collect(),
        exit_code,
        dead,
    }
}

struct Harness {
    registry: Arc<MemoryRegistry>,
    object_storage: Arc<MemoryObjectStorage>,
}

async fn run_one_iteration<A: AutoUpdater>(
    config: &WorkerConfig,
    registry: Arc<MemoryRegistry>,
    scripts: HashMap<String, ScriptedContainer>,
    auto_updater: A,
) -> (Option<Job>, Harness) {
    let registry_dyn: Arc<dyn Registry> = registry.clone();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeContainerRuntime::new(scripts));
    let object_storage = Arc::new(MemoryObjectStorage::default());
    let object_storage_dyn: Arc<dyn ObjectStorage> = object_storage.clone();
    let secrets_decryptor: Arc<dyn SecretDecryptor> = Arc::new(PlaintextSecretDecryptor);

    let mut worker = WorkerLoop::new(config, registry_dyn, runtime, object_storage_dyn, secrets_decryptor, auto_updater);
    let result = worker.run_loop(Some(1)).await.expect("loop should not error");

    (result, Harness { registry, object_storage })
}

#[tokio::test]
async fn s1_successful_eval_finishes_with_two_logs_and_digests() {
    let config = test_config();
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_job(eval_job("abc", "https://liaison.botleague.io"));
    registry.seed_instance(Instance {
        id: INSTANCE_ID.to_string(),
        status: InstanceStatus::Used,
        time_last_available: None,
    });

    let mut scripts = HashMap::new();
    scripts.insert(
        "deepdriveio/deepdrive:problem_domain_randomization".to_string(),
        scripted(&["problem started", "problem done"], 0, false),
    );
    scripts.insert(
        "deepdriveio/deepdrive:bot_domain_randomization".to_string(),
        scripted(&["bot started", "bot done"], 0, false),
    );

    let (last_job, harness) = run_one_iteration(&config, registry, scripts, NeverUpdater).await;

    let job = last_job.expect("a job should have been processed");
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.results.logs.len(), 2);
    assert!(job.results.problem_docker_digest.is_some());
    assert!(job.results.bot_docker_digest.is_some());
    assert!(job.worker_error.is_none());

    let instance = harness.registry.instances().get(INSTANCE_ID).await.unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Available);

    for url in job.results.logs.values() {
        let object_key = url.rsplit('/').next().unwrap();
        assert!(harness.object_storage.fetch(object_key).await.is_ok());
    }
}

#[tokio::test]
async fn s3_problem_exit_one_records_error_but_still_finishes() {
    let config = test_config();
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_job(eval_job("s3", "https://liaison.botleague.io"));
    registry.seed_instance(Instance {
        id: INSTANCE_ID.to_string(),
        status: InstanceStatus::Used,
        time_last_available: None,
    });

    let mut scripts = HashMap::new();
    scripts.insert(
        "deepdriveio/deepdrive:problem_domain_randomization".to_string(),
        scripted(&["boom"], 1, false),
    );
    scripts.insert(
        "deepdriveio/deepdrive:bot_domain_randomization".to_string(),
        scripted(&["ok"], 0, false),
    );

    let (last_job, _harness) = run_one_iteration(&config, registry, scripts, NeverUpdater).await;

    let job = last_job.expect("a job should have been processed");
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.results.logs.len(), 2);
    assert!(job.results.errors.values().any(|msg| msg.contains("exit code 1")));
}

#[tokio::test]
async fn s5_auto_update_mid_idle_returns_without_polling_jobs() {
    struct AlreadyUpdated;
    #[async_trait]
    impl AutoUpdater for AlreadyUpdated {
        async fn is_update_available(&mut self) -> bool {
            true
        }
    }

    let config = test_config();
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_job(eval_job("never-touched", "https://liaison.botleague.io"));
    registry.seed_instance(Instance {
        id: INSTANCE_ID.to_string(),
        status: InstanceStatus::Used,
        time_last_available: None,
    });

    let (last_job, harness) = run_one_iteration(&config, registry, HashMap::new(), AlreadyUpdated).await;

    assert!(last_job.is_none(), "loop must return before touching any job");
    let job = harness.registry.jobs().get("TEST_JOB_never-touched").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Assigned, "job must be untouched");
    let instance = harness.registry.instances().get(INSTANCE_ID).await.unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Used, "instance must be untouched");
}

#[tokio::test]
async fn s6_sim_build_runs_one_container_with_decrypted_credentials() {
    let config = test_config();
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_job(Job {
        id: "TEST_JOB_build1".to_string(),
        instance_id: INSTANCE_ID.to_string(),
        status: JobStatus::Assigned,
        started_at: None,
        finished_at: None,
        results: Default::default(),
        worker_error: None,
        payload: JobPayload::SimBuild {
            build: BuildSpec {
                commit: "e5df9180".to_string(),
                branch: "v3_stable".to_string(),
                build_id: "b1".to_string(),
            },
        },
    });
    registry.seed_instance(Instance {
        id: INSTANCE_ID.to_string(),
        status: InstanceStatus::Used,
        time_last_available: None,
    });
    for name in ["cloud_access_key", "cloud_secret_key", "registry_user", "registry_pass"] {
        registry.seed_secret(botleague_worker::job::Secret {
            name: name.to_string(),
            ciphertext: format!("cipher-{name}"),
        });
    }

    let mut scripts = HashMap::new();
    scripts.insert(
        botleague_worker::config::SIM_BUILD_BASE_IMAGE.to_string(),
        scripted(&["building..."], 0, false),
    );

    let (last_job, _harness) = run_one_iteration(&config, registry, scripts, NeverUpdater).await;

    let job = last_job.expect("a job should have been processed");
    assert_eq!(job.status, JobStatus::Finished);
    assert!(job.results.sim_base_docker_digest.is_some());
    assert_eq!(job.results.logs.len(), 1);
}

#[tokio::test]
async fn s1_outside_test_mode_posts_results_to_the_liaison() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/results"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.is_test = false;

    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_job(eval_job("posts", &server.uri()));
    registry.seed_instance(Instance {
        id: INSTANCE_ID.to_string(),
        status: InstanceStatus::Used,
        time_last_available: None,
    });

    let mut scripts = HashMap::new();
    scripts.insert(
        "deepdriveio/deepdrive:problem_domain_randomization".to_string(),
        scripted(&["hi"], 0, false),
    );
    scripts.insert(
        "deepdriveio/deepdrive:bot_domain_randomization".to_string(),
        scripted(&["hi"], 0, false),
    );

    let (last_job, _harness) = run_one_iteration(&config, registry, scripts, NeverUpdater).await;
    assert_eq!(last_job.unwrap().status, JobStatus::Finished);

    server.verify().await;
}

#[tokio::test]
async fn loop_with_no_assigned_job_leaves_external_state_unchanged() {
    let config = test_config();
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_instance(Instance {
        id: INSTANCE_ID.to_string(),
        status: InstanceStatus::Used,
        time_last_available: None,
    });

    let (last_job, harness) = run_one_iteration(&config, registry, HashMap::new(), NeverUpdater).await;

    assert!(last_job.is_none());
    let instance = harness.registry.instances().get(INSTANCE_ID).await.unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Used);
}
