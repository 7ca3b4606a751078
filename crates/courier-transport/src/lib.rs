//! # Courier Transport
//!
//! Transport implementations for the Courier message-dispatch framework.
//!
//! A transport has two halves:
//!
//! - an outbound [`MessageRouter`](courier_framework::MessageRouter) that
//!   hands envelopes to the medium, declining the ones it cannot address
//! - an inbound side that feeds delivered envelopes to
//!   [`Broker::receive`](courier_framework::Broker::receive)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  try_send   ┌──────────────────┐  inbox   ┌───────────────┐
//! │ Broker A │────────────▶│  InProcessHub    │────────▶│ HubConnection │──▶ Broker B
//! └──────────┘ (router)    │ instance → inbox │          └───────────────┘   receive()
//!                          └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let hub = InProcessHub::new();
//! let mut connection = hub.attach(&Endpoint::instance("worker-1"))?;
//! let registration = InProcessRouter::new(hub.clone()).registration()?;
//!
//! while let Some(envelope) = connection.recv().await {
//!     broker.receive(envelope).await;
//! }
//! ```

pub mod hub;
pub mod router;

pub use hub::{DEFAULT_INBOX_CAPACITY, HubConnection, InProcessHub};
pub use router::{IN_PROCESS_PATTERN, InProcessRouter};
