//! Switchboard — per-connection job-processing core of a protocol hub.
//!
//! Routes normalized activity messages from client sockets to pluggable
//! platform adapters and routes adapter-originated messages back to
//! interested clients. One [`worker::Worker`] per socket connection
//! multiplexes that socket's job stream against shared, long-lived
//! platform instances, gated by verified encrypted credentials and
//! executed under crash isolation.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod logging;
pub mod types;

pub mod platform;
pub mod registry;
pub mod socket;
pub mod store;

pub mod invoker;
pub mod queue;
pub mod worker;
