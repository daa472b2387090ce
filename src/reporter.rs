//! Results Reporter (C7): POSTs final results to the liaison endpoint with
//! bounded retries (spec §4.7).

use std::time::Duration;

use serde_json::Value as Json;
use thiserror::Error;

const MAX_ATTEMPTS: usize = 5;
const BACKOFF: Duration = Duration::from_secs(1);
/// HTTP statuses the business layer treats as terminal outcomes: 400/500
/// carry a valid error payload and are not retried (spec §4.7).
const TERMINAL_STATUSES: [u16; 3] = [200, 400, 500];

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("POST {url} never reached a terminal status after {attempts} attempts: {raw_error_message}")]
    Exhausted {
        url: String,
        attempts: usize,
        raw_error_message: String,
    },
}

/// Posts `{eval_key, results}` to `{liaison}/results`. Elided entirely in
/// test mode (spec §8 invariant 6: "the worker never issues POST /results
/// in test mode").
pub async fn post_results(
    client: &reqwest::Client,
    liaison_host: &str,
    eval_key: &str,
    results: &Json,
    is_test: bool,
) -> Result<Option<reqwest::StatusCode>, ReporterError> {
    if is_test {
        info!("test mode: skipping POST to liaison");
        return Ok(None);
    }

    let url = format!("{liaison_host}/results");
    let body = serde_json::json!({ "eval_key": eval_key, "results": results });

    let mut last_error = String::new();
    for attempt in 1..=MAX_ATTEMPTS {
        match client.post(&url).json(&body).send().await {
            Ok(resp) if TERMINAL_STATUSES.contains(&resp.status().as_u16()) => return Ok(Some(resp.status())),
            Ok(resp) => last_error = format!("non-terminal status {}", resp.status()),
            Err(e) => last_error = e.to_string(),
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(BACKOFF).await;
        }
    }

    Err(ReporterError::Exhausted {
        url,
        attempts: MAX_ATTEMPTS,
        raw_error_message: last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn post_results_is_elided_in_test_mode() {
        let client = reqwest::Client::new();
        let status = post_results(&client, "http://example.invalid", "key", &serde_json::json!({}), true)
            .await
            .unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn post_results_treats_200_as_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/results"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let status = post_results(&client, &server.uri(), "key", &serde_json::json!({"ok": true}), false)
            .await
            .unwrap();
        assert_eq!(status, Some(reqwest::StatusCode::OK));
    }

    #[tokio::test]
    async fn post_results_treats_400_as_terminal_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/results"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let status = post_results(&client, &server.uri(), "key", &serde_json::json!({}), false)
            .await
            .unwrap();
        assert_eq!(status, Some(reqwest::StatusCode::BAD_REQUEST));
    }
}
