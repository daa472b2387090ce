//! The Job/Instance/Secrets data model (spec §3).
//!
//! The source relies on schema-less nested records; we represent that here
//! as a tagged-union job envelope (`JobType`) plus a bounded `Results`
//! record with one open-ended `extras` map for arbitrary problem-container
//! output, per SPEC_FULL.md §9.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Strict forward-progression status, spec §3 invariant 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Assigned,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Eval,
    SimBuild,
    DeepdriveBuild,
}

/// Definition of the problem a bot is evaluated against; mostly opaque to
/// the worker beyond `container_postfix`, which lets a problem pin an
/// alternate image suffix (spec §4.8 EVAL step 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemDef {
    #[serde(default)]
    pub container_postfix: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSpec {
    pub docker_tag: String,
    pub eval_id: String,
    pub eval_key: String,
    pub seed: i64,
    pub problem: String,
    #[serde(default)]
    pub problem_def: Option<ProblemDef>,
    #[serde(default)]
    pub full_eval_request: Option<Json>,
    /// If set, only the problem container is run (no bot), used by
    /// problem-side smoke tests.
    #[serde(default)]
    pub run_problem_only: bool,
}

/// Fields specific to a SIM_BUILD or DEEPDRIVE_BUILD job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    pub commit: String,
    pub branch: String,
    pub build_id: String,
}

/// The tagged union replacing the source's stringly-typed `job_type`
/// dispatch (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum JobPayload {
    #[serde(rename = "EVAL")]
    Eval {
        eval_spec: EvalSpec,
        botleague_liaison_host: String,
    },
    #[serde(rename = "SIM_BUILD")]
    SimBuild {
        #[serde(flatten)]
        build: BuildSpec,
    },
    #[serde(rename = "DEEPDRIVE_BUILD")]
    DeepdriveBuild {
        #[serde(flatten)]
        build: BuildSpec,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Eval { .. } => JobType::Eval,
            JobPayload::SimBuild { .. } => JobType::SimBuild,
            JobPayload::DeepdriveBuild { .. } => JobType::DeepdriveBuild,
        }
    }
}

/// Open-structured results record (spec §3): bounded well-known fields plus
/// an `extras` map merged from problem-container output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Results {
    #[serde(default)]
    pub logs: HashMap<String, String>,
    #[serde(default)]
    pub errors: HashMap<String, String>,
    #[serde(default)]
    pub json_results_from_logs: String,
    #[serde(default)]
    pub problem_docker_digest: Option<String>,
    #[serde(default)]
    pub bot_docker_digest: Option<String>,
    #[serde(default)]
    pub sim_base_docker_digest: Option<String>,
    #[serde(default)]
    pub deepdrive_base_docker_digest: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Json>,
}

impl Results {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Deep-merge of `other` into `self`, used when the file-channel
    /// `results.json` (spec §4.5) is merged on top of the in-progress
    /// record. Top-level scalar keys in `other` overwrite; `extras` entries
    /// merge key-by-key.
    pub fn merge(&mut self, other: Json) {
        let Json::Object(map) = other else {
            return;
        };
        for (k, v) in map {
            match k.as_str() {
                "logs" => {
                    if let Json::Object(logs) = &v {
                        for (id, url) in logs {
                            if let Some(url) = url.as_str() {
                                self.logs.insert(id.clone(), url.to_string());
                            }
                        }
                    }
                }
                "errors" => {
                    if let Json::Object(errs) = &v {
                        for (id, msg) in errs {
                            if let Some(msg) = msg.as_str() {
                                self.errors.insert(id.clone(), msg.to_string());
                            }
                        }
                    }
                }
                "json_results_from_logs" => {
                    if let Some(s) = v.as_str() {
                        self.json_results_from_logs = s.to_string();
                    }
                }
                "problem_docker_digest" => self.problem_docker_digest = v.as_str().map(str::to_string),
                "bot_docker_digest" => self.bot_docker_digest = v.as_str().map(str::to_string),
                "sim_base_docker_digest" => self.sim_base_docker_digest = v.as_str().map(str::to_string),
                "deepdrive_base_docker_digest" => self.deepdrive_base_docker_digest = v.as_str().map(str::to_string),
                "error" => self.error = v.as_str().map(str::to_string),
                _ => {
                    self.extras.insert(k, v);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub instance_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub results: Results,
    #[serde(default)]
    pub worker_error: Option<String>,
    #[serde(flatten)]
    pub payload: JobPayload,
}

impl Job {
    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    Available,
    Used,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub time_last_available: Option<chrono::DateTime<chrono::Utc>>,
}

/// An encrypted secret blob, decrypted by the Identity provider's symmetric
/// KMS (spec §3); the ciphertext shape is opaque to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub ciphertext: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_merge_overwrites_known_fields_and_collects_extras() {
        let mut results = Results::empty();
        results.merge(serde_json::json!({
            "problem_docker_digest": "sha256:aaa",
            "score": 0.9,
            "logs": {"c1": "https://example/c1.txt"},
        }));
        assert_eq!(results.problem_docker_digest.as_deref(), Some("sha256:aaa"));
        assert_eq!(results.extras.get("score"), Some(&serde_json::json!(0.9)));
        assert_eq!(results.logs.get("c1").map(String::as_str), Some("https://example/c1.txt"));
    }

    #[test]
    fn job_type_matches_payload_variant() {
        let job = Job {
            id: "TEST_JOB_abc".into(),
            instance_id: "9999999999999999999".into(),
            status: JobStatus::Assigned,
            started_at: None,
            finished_at: None,
            results: Results::empty(),
            worker_error: None,
            payload: JobPayload::Eval {
                eval_spec: EvalSpec {
                    docker_tag: "deepdriveio/deepdrive:bot_domain_randomization".into(),
                    eval_id: "abc".into(),
                    eval_key: "fake".into(),
                    seed: 1,
                    problem: "domain_randomization".into(),
                    problem_def: None,
                    full_eval_request: None,
                    run_problem_only: false,
                },
                botleague_liaison_host: "https://liaison.botleague.io".into(),
            },
        };
        assert_eq!(job.job_type(), JobType::Eval);
    }

    #[test]
    fn job_status_serializes_as_uppercase() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
