//! Procedural macros for the Courier message-dispatch framework.
//!
//! This crate provides:
//!
//! - `#[derive(Message)]` - Implements `courier_core::Message` with static metadata
//!
//! # Message Derive Macro
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Debug, Message)]
//! #[message(name = "billing.invoice", kinds("NonFree"), requires("billing"))]
//! pub struct CreateInvoice {
//!     pub amount: u64,
//! }
//! ```

mod message;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `courier_core::Message` for structs and enums.
///
/// This generates:
/// - `message_name(&self) -> &'static str` - The message name
/// - `kinds(&self) -> &'static [&'static str]` - Hierarchy tags
/// - `required_features(&self) -> &'static [&'static str]` - Required features
///
/// # Attributes
///
/// - `#[message(name = "...")]` - Override the message name (default: the type name)
/// - `#[message(kinds("A", "B"))]` - Ancestor/interface tags for behavior matching
/// - `#[message(requires("feature"))]` - Features that must be enabled
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug, Message)]
/// #[message(kinds("Query"))]
/// pub struct GetBalance {
///     pub account: String,
/// }
/// ```
#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
