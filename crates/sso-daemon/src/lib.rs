//! Sso Daemon - process entry point wiring.
//!
//! This crate provides:
//! - The §6 JSON-RPC dispatch over the Daemon/Identity/Session object
//!   surface ([`rpc`])
//! - The local Unix Domain Socket transport ([`socket`])
//! - Object-path bookkeeping for Identity and Session objects
//!   ([`identity_registry`], [`session_paths`])
//! - The `stateChanged`/`infoUpdated`/`unregistered` signal bus
//!   ([`signals`])
//! - Identity-map <-> wire-map conversions ([`convert`])
//! - SIGTERM/SIGINT shutdown handling ([`shutdown`])
//!
//! `main.rs` is the thin binary entry point; everything it needs to
//! assemble the running daemon lives here so it's testable without a
//! process boundary.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod convert;
pub mod identity_registry;
pub mod rpc;
pub mod session_paths;
pub mod shutdown;
pub mod signals;
pub mod socket;

pub use rpc::AppState;
