//! The action model: named local capabilities exposed as MCP tools.
//!
//! An action pairs a parameter schema with exactly one runner — a local
//! process invocation or an HTTP call. A loaded set of actions forms an
//! `ActionRegistry`, an immutable snapshot that is replaced wholesale on
//! config reload, never mutated in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// JSON type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

/// A declared action parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "type", default = "default_param_kind")]
    pub kind: ParamKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_param_kind() -> ParamKind {
    ParamKind::String
}

/// Process-backed execution: either an inline `shell` script or an
/// explicit `command` with arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRunner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// HTTP-backed execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpRunner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    pub url: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Dot-notation path to narrow the response body, e.g. `data.items[0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_json: Option<String>,
}

/// The execution backend of an action. Only the invoker branches on the
/// variant; the dispatcher treats invocation as opaque.
#[derive(Debug, Clone)]
pub enum Runner {
    Process(ProcessRunner),
    Http(HttpRunner),
}

/// A named local capability invocable via `tools/call`.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub runner: Runner,
    /// Extra environment variables for process runners; values support
    /// `${VAR}` expansion at invocation time.
    pub environment: HashMap<String, String>,
}

/// An immutable, ordered snapshot of loaded actions.
///
/// Lookup is by exact name. Iteration preserves declaration order so that
/// `tools/list` mirrors the config file.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<Action>,
}

impl ActionRegistry {
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_action(name: &str) -> Action {
        Action {
            name: name.to_string(),
            description: String::new(),
            parameters: Vec::new(),
            runner: Runner::Process(ProcessRunner {
                shell: Some("true".into()),
                ..Default::default()
            }),
            environment: HashMap::new(),
        }
    }

    #[test]
    fn lookup_is_exact_match() {
        let registry = ActionRegistry::from_actions(vec![shell_action("deploy")]);
        assert!(registry.get("deploy").is_some());
        assert!(registry.get("Deploy").is_none());
        assert!(registry.get("deploy2").is_none());
    }

    #[test]
    fn iteration_preserves_declaration_order() {
        let registry = ActionRegistry::from_actions(vec![
            shell_action("b"),
            shell_action("a"),
            shell_action("c"),
        ]);
        let names: Vec<&str> = registry.actions().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn parameter_kind_defaults_to_string() {
        let param: Parameter = serde_json::from_str(r#"{"name":"city"}"#).unwrap();
        assert_eq!(param.kind, ParamKind::String);
        assert!(!param.required);
    }
}
