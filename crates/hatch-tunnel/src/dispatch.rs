//! MCP request dispatch.
//!
//! Routes the method set (`initialize`, `tools/list`, `tools/call`,
//! `ping`) against the current registry snapshot. Dispatch never fails
//! the outer call: every failure mode is encoded as an RPC error object
//! echoing the caller's request id.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use hatch_core::action::{Action, ActionRegistry};
use hatch_core::rpc::{
    RpcRequest, RpcResponse, INVALID_PARAMS, MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND,
};

use crate::exec::Invoker;
use crate::registry::RegistryCell;

/// Cheaply cloneable MCP dispatcher bound to a hot-swappable registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    server_name: String,
    server_version: String,
    registry: RegistryCell,
    invoker: Invoker,
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

impl Dispatcher {
    pub fn new(
        server_name: impl Into<String>,
        server_version: impl Into<String>,
        registry: RegistryCell,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                server_name: server_name.into(),
                server_version: server_version.into(),
                registry,
                invoker: Invoker::new(),
            }),
        }
    }

    /// Swap the action registry. Takes effect for the very next request;
    /// requests already holding a snapshot finish against the old one.
    pub fn update_registry(&self, registry: ActionRegistry) {
        info!(actions = registry.len(), "action registry updated");
        self.inner.registry.replace(registry);
    }

    pub fn registry(&self) -> &RegistryCell {
        &self.inner.registry
    }

    /// Route one MCP request to a response.
    pub async fn dispatch(&self, req: RpcRequest) -> RpcResponse {
        debug!(method = %req.method, "dispatching request");
        match req.method.as_str() {
            "initialize" => self.initialize(req),
            "tools/list" => self.tools_list(req),
            "tools/call" => self.tools_call(req).await,
            "ping" => RpcResponse::ok(req.id, json!({})),
            other => RpcResponse::err(
                req.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }

    fn initialize(&self, req: RpcRequest) -> RpcResponse {
        RpcResponse::ok(
            req.id,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "serverInfo": {
                    "name": self.inner.server_name,
                    "version": self.inner.server_version,
                },
                "capabilities": {
                    "tools": {},
                },
            }),
        )
    }

    fn tools_list(&self, req: RpcRequest) -> RpcResponse {
        let registry = self.inner.registry.current();
        let tools: Vec<Value> = registry.actions().iter().map(tool_entry).collect();
        RpcResponse::ok(req.id, json!({ "tools": tools }))
    }

    async fn tools_call(&self, req: RpcRequest) -> RpcResponse {
        let params: CallParams = match req.params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            _ => return RpcResponse::err(req.id, INVALID_PARAMS, "Invalid params"),
        };

        // Look up against the current snapshot so a hot reload is live for
        // this very call.
        let registry = self.inner.registry.current();
        let action = match registry.get(&params.name) {
            Some(action) => action,
            None => {
                return RpcResponse::err(
                    req.id,
                    INVALID_PARAMS,
                    format!("Tool not found: {}", params.name),
                )
            }
        };

        info!(action = %action.name, "invoking action");
        let outcome = self.inner.invoker.invoke(action, &params.arguments).await;
        debug!(
            action = %action.name,
            exit_code = outcome.exit_code,
            elapsed_ms = outcome.duration.as_millis() as u64,
            "invocation finished"
        );

        let text = match &outcome.error {
            Some(error) if outcome.output.is_empty() => format!("Error: {error}"),
            _ => outcome.output,
        };

        RpcResponse::ok(
            req.id,
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": outcome.exit_code != 0,
            }),
        )
    }
}

/// Project one action into its `tools/list` entry, with the parameter
/// list rendered as a JSON-Schema object.
fn tool_entry(action: &Action) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &action.parameters {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(param.kind.as_str()));
        prop.insert("description".into(), json!(param.description));
        if let Some(default) = param.default.as_deref().filter(|d| !d.is_empty()) {
            prop.insert("default".into(), json!(default));
        }
        properties.insert(param.name.clone(), Value::Object(prop));

        if param.required {
            required.push(param.name.clone());
        }
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), json!(required));
    }

    json!({
        "name": action.name,
        "description": action.description,
        "inputSchema": Value::Object(schema),
    })
}
