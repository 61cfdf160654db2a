//! Authentication and listen-socket core for a streaming media server.
//!
//! This crate turns raw accepted network connections into authenticated,
//! role-bearing [`client::Client`] sessions gated by access-control lists. It
//! is built from four tightly coupled pieces:
//!
//! - [`auth`] — a single plugged-in auth method with its own optional worker
//!   thread and bounded FIFO, and the ordered [`auth::stack::AuthStack`] of
//!   authenticators a client walks until one matches.
//! - [`listener`] — the set of bound sockets, reconfigurable at runtime,
//!   feeding accepted connections into the client pipeline.
//! - [`client`] — client creation, auth binding, keep-alive / TLS-upgrade
//!   reuse, and destruction.
//!
//! HTTP parsing, mount points, stream sources, stats, and configuration file
//! parsing are external collaborators and out of scope for this crate.

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod acl;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod method;
