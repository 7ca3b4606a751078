//! # Courier Runtime
//!
//! Runs one Courier application instance.
//!
//! This crate provides:
//! - Layered configuration loading and validation ([`ConfigLoader`],
//!   [`CourierConfig`])
//! - Logging setup on `tracing-subscriber` ([`LoggingBuilder`])
//! - Runtime composition ([`CourierRuntime`]): behavior pipeline with the
//!   configured built-in behaviors, validated router table, broker,
//!   in-process hub attachment and the periodic sweeper
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder()
//!         .handler::<Ping, _>(ping_handler)
//!         .hub(hub)
//!         .build()?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, LoggingConfig, load_config,
    load_config_from_file, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};
pub use runtime::{CourierRuntime, RuntimeBuilder};

// Re-export tracing for use by applications
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for applications.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
