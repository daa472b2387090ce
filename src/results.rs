//! Result Collector (C6): reads the problem container's `results.json` off
//! a host-mounted directory, and scans container run-logs for the
//! stdout-JSON sentinel (spec §4.5).

use std::path::Path;

use serde_json::Value as Json;

use crate::job::Results;

const STDOUT_JSON_DELIMITER: &str = "|~__JSON_OUT_LINE_DELIMITER__~|";

/// File channel: reads `<results_mount>/<inner_dir>/results.json`. Valid
/// JSON is deep-merged into `results`; otherwise `results.error` is set
/// (spec §4.5, §7 "Missing results artifact" — not fatal).
pub fn merge_file_channel(results: &mut Results, results_mount: &Path, inner_dir: &str) {
    let path = results_mount.join(inner_dir).join("results.json");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            results.error = Some(format!("could not read {}: {e}", path.display()));
            return;
        }
    };

    match serde_json::from_str::<Json>(&raw) {
        Ok(parsed) => results.merge(parsed),
        Err(e) => {
            results.error = Some(format!("results.json at {} is not valid JSON: {e}", path.display()));
        }
    }
}

/// Stdout channel: the sentinel the spec mandates is
/// `|~__JSON_OUT_LINE_DELIMITER__~|` — the alternate form seen in some
/// source revisions (`π__JSON_OUT_LINE_DELIMITER__π`) is intentionally
/// never recognized (spec §9 Open Questions).
pub fn extract_stdout_json(run_log: &str) -> String {
    let Some(start) = run_log.find(STDOUT_JSON_DELIMITER) else {
        return String::new();
    };
    let after = &run_log[start + STDOUT_JSON_DELIMITER.len()..];
    after.split('\n').next().unwrap_or("").to_string()
}
