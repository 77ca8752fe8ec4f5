//! HTTP surface and process lifecycle
//!
//! Provides Kubernetes health probes and the shutdown trigger:
//! - `/livez` - Liveness probe (process is running)
//! - `/readyz` - Readiness probe (listener is serving)
//! - `/shutdown` - Power the host off
//!
//! Also owns the listener and the SIGTERM/SIGINT driven drain.

mod health;
mod poweroff;
pub mod shutdown;
mod supervisor;

pub use health::{build_router, AppState, PROBE_BODY};
pub use poweroff::{SHUTDOWN_FAILED_BODY, SHUTDOWN_OK_BODY};
pub use shutdown::spawn_signal_watcher;
pub use supervisor::{
    bind_listener, Supervisor, SupervisorError, SupervisorState, TerminationReason, DRAIN_TIMEOUT,
};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod supervisor_tests;
