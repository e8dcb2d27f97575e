//! `hatch.yaml` loading and validation.
//!
//! The raw file text goes through `${VAR}` environment expansion before
//! the YAML parse, so secrets can be referenced without being written to
//! disk. A successful load yields both the file-level settings and the
//! immutable `ActionRegistry` snapshot consumed by the dispatcher.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use hatch_core::action::{Action, ActionRegistry, HttpRunner, Parameter, ProcessRunner, Runner};
use hatch_core::expand::expand_env;

/// Top-level `hatch.yaml` structure.
#[derive(Debug, Clone, Deserialize)]
pub struct HatchConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// One action entry as written in the config file. Exactly one of
/// `process` / `http` must be present.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Vec<Parameter>,

    #[serde(default)]
    pub process: Option<ProcessRunner>,

    #[serde(default)]
    pub http: Option<HttpRunner>,

    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_name() -> String {
    "hatch-local".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Read, expand, parse, and validate a config file.
pub fn load(path: &Path) -> Result<(HatchConfig, ActionRegistry)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let raw = expand_env(&raw);

    let config: HatchConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;

    let registry = build_registry(&config)?;
    Ok((config, registry))
}

/// Validate the parsed config and build the registry snapshot.
pub fn build_registry(config: &HatchConfig) -> Result<ActionRegistry> {
    let mut actions = Vec::with_capacity(config.actions.len());
    let mut names = HashSet::new();

    for (index, spec) in config.actions.iter().enumerate() {
        if spec.name.is_empty() {
            bail!("action {index}: name is required");
        }
        if !names.insert(spec.name.as_str()) {
            bail!("duplicate action name: {}", spec.name);
        }

        let mut param_names = HashSet::new();
        for param in &spec.parameters {
            if param.name.is_empty() {
                bail!("action {}: parameter name is required", spec.name);
            }
            if !param_names.insert(param.name.as_str()) {
                bail!(
                    "action {}: duplicate parameter name: {}",
                    spec.name,
                    param.name
                );
            }
        }

        let runner = match (&spec.process, &spec.http) {
            (Some(process), None) => {
                if process.command.is_none() && process.shell.is_none() {
                    bail!(
                        "action {}: process.command or process.shell is required",
                        spec.name
                    );
                }
                Runner::Process(process.clone())
            }
            (None, Some(http)) => {
                if http.url.is_empty() {
                    bail!("action {}: http.url is required", spec.name);
                }
                Runner::Http(http.clone())
            }
            (Some(_), Some(_)) => {
                bail!("action {}: process and http are mutually exclusive", spec.name)
            }
            (None, None) => bail!("action {}: a process or http runner is required", spec.name),
        };

        actions.push(Action {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
            runner,
            environment: spec.environment.clone(),
        });
    }

    Ok(ActionRegistry::from_actions(actions))
}
