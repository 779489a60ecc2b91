//! In-memory status cache: the store, its throttle gate and the derived
//! aggregate.

pub mod aggregate;
pub mod events;
pub mod store;
pub mod throttle;

pub use aggregate::{AggregateSnapshot, AggregateView, StatusCounts};
pub use events::StatusEvent;
pub use store::{CommitOutcome, StatusStore};
pub use throttle::ThrottlePolicy;
