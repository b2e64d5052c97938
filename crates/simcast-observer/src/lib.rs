//! Observer API server for Simcast.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) streaming snapshots, state-change
//!   events and log lines, and accepting playback commands from clients
//! - **REST endpoints** for status, the latest snapshot, and the five
//!   playback commands
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The step loop hands every snapshot to an [`ObserverSink`], which keeps
//! only the latest one. A publisher task forwards that latest snapshot to
//! clients at the configured broadcast frequency, so a fast-forwarding
//! loop does not flood slow clients. Events and log lines bypass the
//! throttle and go out immediately.
//!
//! [`ObserverSink`]: sink::ObserverSink

pub mod commands;
pub mod error;
pub mod handlers;
pub mod publisher;
pub mod router;
pub mod server;
pub mod sink;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, serve};
pub use sink::{ObserverSink, OutboundMessage};
pub use startup::{ObserverHandle, spawn_observer};
pub use state::AppState;
