//! PV status monitor.
//!
//! Keeps the latest status of every tracked PV system in a per-session
//! store, throttles how often a system's record may change, and derives an
//! overall fleet status from the worst individual one.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod poller;
pub mod session;
pub mod solarweb;
pub mod telemetry;

pub use cache::{AggregateSnapshot, AggregateView, StatusEvent, StatusStore, ThrottlePolicy};
pub use domain::{StatusRecord, SystemStatus};
pub use poller::{Poller, PollerConfig, PollerRegistry, StatusSource};
pub use session::MonitorSession;
