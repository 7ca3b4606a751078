//! # Courier
//!
//! Typed message dispatch for applications made of many instances.
//!
//! ## Overview
//!
//! A message travels inside an envelope through a broker. The broker picks
//! routers by matching recipient urls, and for two-way calls waits for the
//! reply correlated by message id. On the receiving side the message runs
//! through a pipeline of behaviors before its handler.
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐        ┌──────────┐   ┌───────────┐   ┌─────────┐
//! │  caller  │──▶│   Broker    │──▶│  Router   │──hub──▶│  Broker  │──▶│ behaviors │──▶│ handler │
//! │          │◀──│ (pending)   │◀──│  Table    │◀─reply─│ .receive │◀──│  (after)  │◀──│         │
//! └──────────┘   └─────────────┘   └───────────┘        └──────────┘   └───────────┘   └─────────┘
//! ```
//!
//! - **Core**: messages, envelopes, endpoints, errors
//! - **Framework**: behaviors, handlers, router selection, the broker
//! - **Transport**: the in-process hub and its router
//! - **Runtime**: configuration, logging, runtime composition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Debug, Message)]
//! struct Ping;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder()
//!         .handler::<Ping, _>(handler_fn(|_: Arc<Ping>| async { Ok(Value::from("pong")) }))
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `yaml-config`: accept `courier.yaml` configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Commonly used types.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, CourierRuntime};

    // Messages and envelopes
    pub use courier_core::{
        DispatchContext, DispatchError, DispatchResult, Endpoint, Envelope, Identity, Message,
        Value,
    };

    // Handlers and behaviors
    pub use courier_framework::{
        Behavior, BehaviorRegistration, Flow, Handler, Priority, RouterRegistration, handler_fn,
    };

    // In-process transport
    pub use courier_transport::InProcessHub;
}
