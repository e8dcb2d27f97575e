//! HTTP-backed action execution.
//!
//! Builds one request from the action's template (method, url, headers,
//! body all support `{{param}}` and `${VAR}` expansion), maps the response
//! status onto an exit code (>=400 → 1), and optionally narrows the body
//! with a dot-notation JSON path.

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use hatch_core::action::HttpRunner;
use hatch_core::expand::{expand_env, expand_placeholders};

use super::{Outcome, DEFAULT_TIMEOUT};

pub(crate) async fn run(client: &reqwest::Client, spec: &HttpRunner, args: &Map<String, Value>) -> Outcome {
    let start = Instant::now();
    let timeout = spec
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    let url = expand_env(&expand_placeholders(&spec.url, args));
    let method = spec.method.as_deref().unwrap_or("GET").to_uppercase();
    let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);

    debug!(%url, method = %method, "http action request");

    let mut request = client.request(method, &url).timeout(timeout);

    let mut has_content_type = false;
    for (key, value) in &spec.headers {
        if key.eq_ignore_ascii_case("content-type") {
            has_content_type = true;
        }
        request = request.header(key.as_str(), expand_env(&expand_placeholders(value, args)));
    }

    if let Some(body) = &spec.body {
        request = request.body(expand_env(&expand_placeholders(body, args)));
        if !has_content_type {
            request = request.header(CONTENT_TYPE, "application/json");
        }
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return Outcome {
                output: format!("Request failed: {e}"),
                exit_code: -1,
                duration: start.elapsed(),
                error: Some(e.to_string()),
            }
        }
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Outcome {
                output: format!("Failed to read response: {e}"),
                exit_code: -1,
                duration: start.elapsed(),
                error: Some(e.to_string()),
            }
        }
    };

    // Narrow the body if a JSON path is configured; fall back to the raw
    // body when the path does not resolve.
    let output = match &spec.extract_json {
        Some(path) if !body.is_empty() => extract_json_path(&body, path).unwrap_or(body),
        _ => body,
    };

    Outcome {
        output: output.trim().to_string(),
        exit_code: i32::from(status.as_u16() >= 400),
        duration: start.elapsed(),
        error: None,
    }
}

/// Extract a value from a JSON body using dot notation with optional array
/// indices: `data`, `data.items`, `data.items[0].name`.
fn extract_json_path(body: &str, path: &str) -> Option<String> {
    let root: Value = serde_json::from_str(body).ok()?;

    let mut current = &root;
    for segment in path.split('.') {
        let (key, index) = match segment.find('[') {
            Some(open) => {
                let index: usize = segment[open + 1..].strip_suffix(']')?.parse().ok()?;
                (&segment[..open], Some(index))
            }
            None => (segment, None),
        };

        if !key.is_empty() {
            current = current.get(key)?;
        }
        if let Some(index) = index {
            current = current.get(index)?;
        }
    }

    Some(match current {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    })
}
