//! # brickd-core
//!
//! Foundation types for the brickd remote-scripting daemon.
//!
//! This crate provides the shared vocabulary the runtime and server crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::SessionId`] as a newtype over a UUID
//! - **Wire protocol**: [`protocol::ActionMessage`] for inbound frames,
//!   outbound frame builders, and [`protocol::OutboundEnvelope`]
//! - **Errors**: [`errors::BrickError`] taxonomy via `thiserror`, with
//!   stable wire codes and unicast/broadcast classification
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `brickd-runtime` and `brickd-server`.
//! No async, no I/O.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::BrickError;
pub use ids::SessionId;
pub use protocol::{ActionMessage, OutboundEnvelope};
