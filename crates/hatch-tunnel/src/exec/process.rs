//! Process-backed action execution.
//!
//! Two modes: an inline `shell` script run through the user's shell, or an
//! explicit `command` with per-argument expansion. Caller arguments are
//! substituted into `{{name}}` placeholders and additionally exported as
//! `HATCH_ARG_<NAME>` environment variables.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::debug;

use hatch_core::action::{Action, ProcessRunner};
use hatch_core::expand::{expand_env, expand_placeholders, value_text};

use super::{Outcome, DEFAULT_TIMEOUT};

pub(crate) async fn run(action: &Action, spec: &ProcessRunner, args: &Map<String, Value>) -> Outcome {
    let start = Instant::now();
    let timeout = spec
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    let mut cmd = if let Some(script) = &spec.shell {
        let (shell, flag) = default_shell();
        let mut cmd = Command::new(shell);
        cmd.arg(flag).arg(expand_placeholders(script, args));
        cmd
    } else {
        let mut cmd = Command::new(spec.command.as_deref().unwrap_or_default());
        for arg in &spec.args {
            cmd.arg(expand_placeholders(arg, args));
        }
        cmd
    };

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(expand_env(dir));
    }

    for (key, value) in &action.environment {
        cmd.env(key, expand_env(value));
    }
    for (key, value) in args {
        cmd.env(format!("HATCH_ARG_{}", key.to_uppercase()), value_text(value));
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the in-flight future on timeout must also reap the child.
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            debug!(action = %action.name, ?timeout, "process timed out");
            Outcome {
                output: String::new(),
                exit_code: -1,
                duration: start.elapsed(),
                error: Some(format!("timed out after {}s", timeout.as_secs())),
            }
        }
        Ok(Err(e)) => Outcome {
            output: String::new(),
            exit_code: -1,
            duration: start.elapsed(),
            error: Some(format!("failed to start process: {e}")),
        },
        Ok(Ok(out)) => {
            let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.is_empty() {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&stderr);
            }

            let exit_code = out.status.code().unwrap_or(-1);
            Outcome {
                output: output.trim().to_string(),
                exit_code,
                duration: start.elapsed(),
                error: (!out.status.success()).then(|| format!("exit status {exit_code}")),
            }
        }
    }
}

/// The shell used for inline scripts: `$SHELL` (fallback `/bin/sh`) on
/// unix, `cmd /c` on Windows.
fn default_shell() -> (String, &'static str) {
    if cfg!(windows) {
        ("cmd".to_string(), "/c")
    } else {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        (shell, "-c")
    }
}
