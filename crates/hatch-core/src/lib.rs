//! hatch-core: shared protocol library for hatch.
//!
//! Provides the tunnel envelope types exchanged with the relay, the
//! JSON-RPC message shapes spoken with MCP callers, the action model and
//! registry, template expansion, and the shared error taxonomy.

pub mod action;
pub mod envelope;
pub mod error;
pub mod expand;
pub mod rpc;

// Re-export commonly used items at crate root.
pub use action::{Action, ActionRegistry, HttpRunner, ParamKind, Parameter, ProcessRunner, Runner};
pub use envelope::{Envelope, FrameKind};
pub use error::{HatchError, HatchResult};
pub use rpc::{RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION, MCP_PROTOCOL_VERSION};
