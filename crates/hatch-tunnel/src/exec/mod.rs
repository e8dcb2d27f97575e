//! Action invocation backends.
//!
//! The dispatcher hands an action and its arguments to the `Invoker` and
//! gets back a uniform `Outcome`; branching between the process and HTTP
//! backends happens here and nowhere else.

mod http;
mod process;

use std::time::Duration;

use serde_json::{Map, Value};

use hatch_core::action::{Action, Runner};

/// Default deadline for an invocation when the action declares none.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Uniform result of one action invocation.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Trimmed textual output (stdout+stderr, or HTTP response body).
    pub output: String,
    /// Process exit code, or 0/1 from the HTTP status; -1 for failures
    /// before any status was produced.
    pub exit_code: i32,
    pub duration: Duration,
    /// Set when the invocation itself failed (spawn error, timeout,
    /// request error, non-zero exit).
    pub error: Option<String>,
}

/// Executes actions against their configured backend.
#[derive(Clone)]
pub struct Invoker {
    http: reqwest::Client,
}

impl Invoker {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Run one action to completion, bounded by the action's own timeout.
    /// Never fails the outer call — all failure is folded into `Outcome`.
    pub async fn invoke(&self, action: &Action, args: &Map<String, Value>) -> Outcome {
        match &action.runner {
            Runner::Process(spec) => process::run(action, spec, args).await,
            Runner::Http(spec) => http::run(&self.http, spec, args).await,
        }
    }
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new()
    }
}
