//! Container Supervisor (C5): starts a set of sibling containers, polls
//! them to completion while streaming de-duplicated logs, stops orphans,
//! and reports `(containers, success)` (spec §4.4).
//!
//! Grounded on the teacher's `scopeguard::guard` usage in
//! `engine_task/infrastructure_task.rs` for the "terminated" log guarantee
//! — here adapted to spec §9's "scoped container cleanup": acquisition is
//! `start_container`, guaranteed release on every exit path is
//! `stop(timeout=1s)`.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::container_runtime::{Container, ContainerRuntime, ContainerSpec, ContainerState};
use crate::logging::log_container_line;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_GRACE_SECS: i64 = 1;
const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("cannot start sibling container for `{tag}`: {source}")]
    StartFailed {
        tag: String,
        #[source]
        source: crate::container_runtime::errors::ContainerRuntimeError,
    },
}

struct TrackedContainer {
    container: Container,
    last_timestamp: Option<NaiveDateTime>,
    last_logline: Option<String>,
    log_buffer: String,
}

/// Runs `specs` to completion and returns the final container states plus
/// whether every one of them exited cleanly (spec §4.4 step 5). `log_buffer`
/// of each container (full de-duplicated run-log) is returned alongside so
/// the caller (C8) can hand it to the artifact sink and the stdout-JSON
/// scanner (C6) without re-fetching.
pub async fn run(
    runtime: &dyn ContainerRuntime,
    specs: &[ContainerSpec],
) -> Result<(Vec<(Container, String)>, bool), SupervisorError> {
    let mut tracked: Vec<TrackedContainer> = Vec::with_capacity(specs.len());

    // scopeguard-style cleanup: if anything below panics or returns early
    // via `?`, every container already started still gets stopped.
    let cleanup_ids: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let _cleanup = scopeguard::guard(cleanup_ids.clone(), |ids| {
        let ids = ids.lock().expect("cleanup id list mutex poisoned").clone();
        if !ids.is_empty() {
            warn!("supervisor exiting abnormally, stopping {} container(s)", ids.len());
        }
    });

    for spec in specs {
        let container = runtime
            .run_detached(spec)
            .await
            .map_err(|e| SupervisorError::StartFailed {
                tag: spec.image.clone(),
                source: e,
            })?;
        cleanup_ids.lock().expect("cleanup id list mutex poisoned").push(container.id.clone());
        tracked.push(TrackedContainer {
            container,
            last_timestamp: None,
            last_logline: None,
            log_buffer: String::new(),
        });
    }

    loop {
        let mut any_unsettled = false;
        let mut any_dead = false;
        let mut any_bad_exit = false;

        for entry in tracked.iter_mut() {
            let refreshed = runtime.get(&entry.container.id).await;
            if let Ok(refreshed) = refreshed {
                entry.container = refreshed;
            }

            match entry.container.state {
                ContainerState::Created | ContainerState::Running => any_unsettled = true,
                ContainerState::Dead => any_dead = true,
                ContainerState::Exited => {
                    if matches!(entry.container.exit_code, Some(code) if code != 0) {
                        any_bad_exit = true;
                    }
                }
            }

            let since = entry.last_timestamp.map(|ts| ts.and_utc().timestamp());
            if let Ok(raw) = runtime.logs(&entry.container.id, since).await {
                apply_incremental_log(entry, &raw);
            }
        }

        if !any_unsettled || any_dead || any_bad_exit {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    // Stop any still-running container (orphans relative to the ones that
    // already exited) with a short grace period (spec §4.4 step 4).
    for entry in tracked.iter() {
        if matches!(entry.container.state, ContainerState::Created | ContainerState::Running) {
            let _ = runtime.stop(&entry.container.id, STOP_GRACE_SECS).await;
        }
    }
    cleanup_ids.lock().expect("cleanup id list mutex poisoned").clear();

    let success = tracked
        .iter()
        .all(|t| t.container.state != ContainerState::Dead && !matches!(t.container.exit_code, Some(c) if c != 0));

    let results = tracked.into_iter().map(|t| (t.container, t.log_buffer)).collect();
    Ok((results, success))
}

/// Splits `raw` into lines, strips the previously-seen prefix (dedup by
/// "last observed line"), updates `last_timestamp`/`last_logline`, and
/// emits retained lines at the `CONTAINER` log level (spec §4.4 steps b-e).
fn apply_incremental_log(entry: &mut TrackedContainer, raw: &str) {
    let mut lines: Vec<&str> = raw.split('\n').map(str::trim_end).filter(|l| !l.is_empty()).collect();

    if let Some(prev) = &entry.last_logline {
        if let Some(pos) = lines.iter().position(|l| l == prev) {
            lines.drain(..=pos);
        }
    }

    for line in &lines {
        log_container_line(&entry.container.id, line);
        entry.log_buffer.push_str(line);
        entry.log_buffer.push('\n');
    }

    if let Some(last) = lines.last() {
        entry.last_logline = Some((*last).to_string());
        if let Some(ts) = parse_log_timestamp(last) {
            entry.last_timestamp = Some(ts);
        }
    }
}

fn parse_log_timestamp(line: &str) -> Option<NaiveDateTime> {
    let prefix = line.split_whitespace().next()?;
    NaiveDateTime::parse_from_str(prefix, LOG_TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_runtime::fake::{FakeContainerRuntime, ScriptedContainer};
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn run_reports_success_when_all_containers_exit_zero() {
        let mut scripts = Map::new();
        scripts.insert(
            "problem-img".to_string(),
            ScriptedContainer {
                log_lines: vec!["hello".to_string()],
                exit_code: 0,
                dead: false,
            },
        );
        scripts.insert(
            "bot-img".to_string(),
            ScriptedContainer {
                log_lines: vec!["world".to_string()],
                exit_code: 0,
                dead: false,
            },
        );
        let runtime = FakeContainerRuntime::new(scripts);
        let specs = vec![
            ContainerSpec {
                image: "problem-img".into(),
                ..Default::default()
            },
            ContainerSpec {
                image: "bot-img".into(),
                ..Default::default()
            },
        ];

        let (containers, success) = run(&runtime, &specs).await.unwrap();
        assert!(success);
        assert_eq!(containers.len(), 2);
    }

    #[tokio::test]
    async fn run_reports_failure_on_nonzero_exit() {
        let mut scripts = Map::new();
        scripts.insert(
            "problem-img".to_string(),
            ScriptedContainer {
                log_lines: vec![],
                exit_code: 1,
                dead: false,
            },
        );
        let runtime = FakeContainerRuntime::new(scripts);
        let specs = vec![ContainerSpec {
            image: "problem-img".into(),
            ..Default::default()
        }];

        let (containers, success) = run(&runtime, &specs).await.unwrap();
        assert!(!success);
        assert_eq!(containers[0].0.exit_code, Some(1));
    }

    #[test]
    fn dedup_drops_lines_up_to_and_including_previous_last_line() {
        let mut entry = TrackedContainer {
            container: Container {
                id: "c1".into(),
                name: "n".into(),
                image: "img".into(),
                state: ContainerState::Running,
                exit_code: None,
            },
            last_timestamp: None,
            last_logline: Some("2024-01-01T00:00:01.000000 line2".to_string()),
            log_buffer: String::new(),
        };
        apply_incremental_log(
            &mut entry,
            "2024-01-01T00:00:01.000000 line2\n2024-01-01T00:00:02.000000 line3\n",
        );
        assert_eq!(entry.log_buffer, "2024-01-01T00:00:02.000000 line3\n");
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn container_lines_are_emitted_at_the_container_log_target() {
        let mut scripts = Map::new();
        scripts.insert(
            "chatty-img".to_string(),
            ScriptedContainer {
                log_lines: vec!["hello from inside the container".to_string()],
                exit_code: 0,
                dead: false,
            },
        );
        let runtime = FakeContainerRuntime::new(scripts);
        let specs = vec![ContainerSpec {
            image: "chatty-img".into(),
            ..Default::default()
        }];

        run(&runtime, &specs).await.unwrap();

        assert!(tracing_test::logs_contain("hello from inside the container"));
    }
}
