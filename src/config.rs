//! Identity & Config Provider (C1).
//!
//! Resolves VM identity, test/production mode, and the handful of fixed
//! paths and constants the rest of the worker treats as given. Modeled on
//! `original_source/common.py::fetch_instance_id` /
//! `botleague_helpers/config.py::Config`, but built as an immutable value
//! resolved once at startup rather than a class with memoized properties:
//! nothing here changes mid-process, so there's nothing to memoize.

use std::env;
use std::time::Duration;

const METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1/instance/id";

/// Archive registry for re-tagged eval images, see spec §6.
pub const ARCHIVE_REPO: &str = "deepdriveio/botleague";

/// Orphan-container image-name allow-list (spec §6): containers whose image
/// starts with one of the prefixes, or matches one of the exact names, are
/// considered "botleague" containers left over from a previous run.
pub const ORPHAN_IMAGE_PREFIXES: &[&str] = &["deepdriveio/deepdrive:problem_", "deepdriveio/deepdrive:bot_"];
pub const ORPHAN_IMAGE_EXACT: &[&str] = &[
    "deepdriveio/private:deepdrive-sim-package",
    "deepdriveio/ue4-deepdrive-deps:latest",
];

/// `BOTLEAUGE_PROBLEM` is misspelled upstream; external consumers depend on
/// the typo, so we preserve it exactly (spec §9).
pub mod problem_env {
    pub const EVAL_KEY: &str = "BOTLEAGUE_EVAL_KEY";
    pub const SEED: &str = "BOTLEAGUE_SEED";
    pub const PROBLEM: &str = "BOTLEAUGE_PROBLEM";
    pub const RESULT_FILEPATH: &str = "BOTLEAGUE_RESULT_FILEPATH";
    pub const DEEPDRIVE_UPLOAD: &str = "DEEPDRIVE_UPLOAD";
    pub const APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
    pub const SIM_URL: &str = "SIM_URL";
}

pub const IN_CONTAINER_RESULTS_DIR: &str = "/mnt/botleague/botleague_results";
pub const CREDENTIALS_MOUNT_SOURCE: &str = "/root/.gcpcreds";
pub const CREDENTIALS_MOUNT_DEST: &str = "/mnt/.gcpcreds";

pub const LOG_BUCKET: &str = "deepdriveio";
pub const LOG_BUCKET_PREFIX: &str = "botleague_eval_logs";

/// Fixed base images pulled once per build job (spec §4.8
/// SIM_BUILD/DEEPDRIVE_BUILD: "a fixed base image, constant per type").
pub const SIM_BUILD_BASE_IMAGE: &str = "deepdriveio/deepdrive:sim_build_base";
pub const DEEPDRIVE_BUILD_BASE_IMAGE: &str = "deepdriveio/deepdrive:deepdrive_build_base";
/// Host path to the container-control socket, bind-mounted into
/// DEEPDRIVE_BUILD containers for the Docker-in-Docker pattern (spec §4.8).
pub const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

pub const JOBS_COLLECTION: &str = "deepdrive_eval_jobs";
pub const INSTANCES_COLLECTION: &str = "deepdrive_eval_instances";
pub const SECRETS_COLLECTION: &str = "secrets";

/// Worker process configuration, resolved once from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub instance_id: String,
    pub is_test: bool,
    pub force_firestore_db: bool,
    pub should_use_firestore: bool,
    pub gcp_project: Option<String>,
    pub results_mount_base: String,
}

impl WorkerConfig {
    /// Resolves config from the environment, hitting the GCP metadata
    /// endpoint for `INSTANCE_ID` only when not in test mode and no
    /// override was provided.
    pub fn from_env() -> Result<Self, ConfigError> {
        let is_test = env::var("IS_TEST").is_ok();
        let force_firestore_db = env::var("FORCE_FIRESTORE_DB").is_ok();
        let should_use_firestore = env::var("SHOULD_USE_FIRESTORE")
            .map(|v| v != "false")
            .unwrap_or(true);
        let gcp_project = env::var("GOOGLE_CLOUD_PROJECT")
            .or_else(|_| env::var("GCP_PROJECT"))
            .ok();
        let results_mount_base = if is_docker() {
            "/mnt/botleague_results".to_string()
        } else {
            format!("{}/botleague_results", env::current_dir().unwrap_or_default().display())
        };

        let instance_id = resolve_instance_id(is_test)?;

        Ok(WorkerConfig {
            instance_id,
            is_test,
            force_firestore_db,
            should_use_firestore,
            gcp_project,
            results_mount_base,
        })
    }

    /// Per spec §4.2: in-memory registry unless forced to Firestore, or not
    /// in a test and Firestore usage hasn't been explicitly disabled.
    pub fn use_remote_registry(&self) -> bool {
        if self.is_test {
            self.force_firestore_db
        } else {
            self.should_use_firestore
        }
    }
}

fn resolve_instance_id(is_test: bool) -> Result<String, ConfigError> {
    if let Ok(id) = env::var("INSTANCE_ID") {
        return Ok(id);
    }
    if is_test {
        return Ok("3592331990274327389".to_string());
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| ConfigError::MetadataUnreachable(e.to_string()))?;

    let resp = client
        .get(METADATA_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .map_err(|e| ConfigError::MetadataUnreachable(e.to_string()))?;

    resp.error_for_status()
        .map_err(|e| ConfigError::MetadataUnreachable(e.to_string()))?
        .text()
        .map_err(|e| ConfigError::MetadataUnreachable(e.to_string()))
}

fn is_docker() -> bool {
    std::path::Path::new("/.dockerenv").exists()
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unable to get GCP instance metadata: {0}. Are you on GCP? If not, set INSTANCE_ID for testing purposes.")]
    MetadataUnreachable(String),
}
