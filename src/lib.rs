//! Host shutdown agent
//!
//! Serves Kubernetes probes and a `POST /shutdown` trigger that powers the
//! host off, exports request spans over OTLP, and drains gracefully on
//! SIGTERM/SIGINT.

pub mod config;
pub mod power;
pub mod server;
pub mod telemetry;
