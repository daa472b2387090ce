//! In-memory `ContainerRuntime` double used by integration tests (spec §8
//! seed scenarios), analogous to the teacher's `test_utilities` fakes.
//! Each container is scripted with a fixed sequence of log lines and a
//! terminal exit code, and "runs" instantly — the supervisor still drives
//! it through its normal polling loop.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::errors::ContainerRuntimeError;
use super::{Container, ContainerRuntime, ContainerSpec, ContainerState, Image};

#[derive(Clone)]
pub struct ScriptedContainer {
    pub log_lines: Vec<String>,
    pub exit_code: i64,
    pub dead: bool,
}

struct Running {
    container: Container,
    script: ScriptedContainer,
    poll_count: u32,
}

pub struct FakeContainerRuntime {
    scripts: HashMap<String, ScriptedContainer>,
    running: Mutex<HashMap<String, Running>>,
    next_id: Mutex<u64>,
}

impl FakeContainerRuntime {
    pub fn new(scripts: HashMap<String, ScriptedContainer>) -> Self {
        Self {
            scripts,
            running: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn login(&self, _user: &str, _pass: &str) -> Result<(), ContainerRuntimeError> {
        Ok(())
    }

    async fn pull(&self, tag: &str) -> Result<Image, ContainerRuntimeError> {
        Ok(Image {
            digest: format!("sha256:fake-{tag}"),
            tags: vec![format!("{tag}")],
        })
    }

    async fn run_detached(&self, spec: &ContainerSpec) -> Result<Container, ContainerRuntimeError> {
        let script = self
            .scripts
            .get(&spec.image)
            .cloned()
            .unwrap_or(ScriptedContainer {
                log_lines: vec![],
                exit_code: 0,
                dead: false,
            });

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("fake{:012x}", *next_id);

        let container = Container {
            id: id.clone(),
            name: spec.name.clone().unwrap_or_else(|| id.clone()),
            image: spec.image.clone(),
            state: ContainerState::Running,
            exit_code: None,
        };

        self.running.lock().unwrap().insert(
            id.clone(),
            Running {
                container: container.clone(),
                script,
                poll_count: 0,
            },
        );

        Ok(container)
    }

    async fn list_running(&self) -> Result<Vec<Container>, ContainerRuntimeError> {
        Ok(self
            .running
            .lock()
            .unwrap()
            .values()
            .map(|r| r.container.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Container, ContainerRuntimeError> {
        let mut running = self.running.lock().unwrap();
        let entry = running.get_mut(id).ok_or_else(|| ContainerRuntimeError::InspectFailed {
            container_id: id.to_string(),
            raw_error_message: "no such fake container".to_string(),
        })?;

        // Every poll after the first advances the scripted container one
        // step toward its terminal state, giving the supervisor at least
        // one iteration to observe it "running".
        entry.poll_count += 1;
        if entry.poll_count >= 2 {
            entry.container.state = if entry.script.dead {
                ContainerState::Dead
            } else {
                entry.container.exit_code = Some(entry.script.exit_code);
                ContainerState::Exited
            };
        }

        Ok(entry.container.clone())
    }

    async fn logs(&self, id: &str, _since: Option<i64>) -> Result<String, ContainerRuntimeError> {
        let running = self.running.lock().unwrap();
        let entry = running.get(id).ok_or_else(|| ContainerRuntimeError::LogsFailed {
            container_id: id.to_string(),
            raw_error_message: "no such fake container".to_string(),
        })?;
        let mut out = String::new();
        for (i, line) in entry.script.log_lines.iter().enumerate() {
            out.push_str(&format!("2024-01-01T00:00:{:02}.000000 {}\n", i, line));
        }
        Ok(out)
    }

    async fn stop(&self, id: &str, _timeout_secs: i64) -> Result<(), ContainerRuntimeError> {
        self.running.lock().unwrap().remove(id);
        Ok(())
    }

    async fn tag(&self, _image: &str, _repo: &str, _new_tag: &str) -> Result<(), ContainerRuntimeError> {
        Ok(())
    }

    async fn push(&self, _repo: &str, _tag: &str) -> Result<(), ContainerRuntimeError> {
        Ok(())
    }
}
