//! hatch-tunnel: the tunnel session and MCP dispatch engine.
//!
//! Maintains one persistent WebSocket connection to a hatch relay,
//! demultiplexes inbound frames into control messages and concurrent MCP
//! requests, dispatches each request against a hot-swappable action
//! registry, and serializes responses back through a single write gate.
//!
//! # Quick Start
//!
//! ```no_run
//! use hatch_core::action::ActionRegistry;
//! use hatch_tunnel::{Dispatcher, RegistryCell, SessionConfig, TunnelSession};
//!
//! # async fn example() -> hatch_core::HatchResult<()> {
//! let registry = RegistryCell::new(ActionRegistry::default());
//! let dispatcher = Dispatcher::new("my-actions", "1.0.0", registry);
//!
//! let session = TunnelSession::connect(
//!     SessionConfig {
//!         relay_url: "wss://relay.hatch.sh".into(),
//!         ..Default::default()
//!     },
//!     dispatcher,
//! )
//! .await?;
//!
//! println!("public URL: {}", session.tunnel_url());
//! session.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod exec;
pub mod registry;
pub mod session;

// Re-export primary public types.
pub use dispatch::Dispatcher;
pub use exec::{Invoker, Outcome};
pub use registry::RegistryCell;
pub use session::{ClientConnectedHook, SessionConfig, TunnelSession};

// Re-export hatch-core error types for convenience.
pub use hatch_core::{HatchError, HatchResult};
