//! Solar.web query API: authenticated client, error-code colour catalog and
//! the [`StatusSource`](crate::poller::StatusSource) built on both.

pub mod client;
pub mod error_codes;
pub mod models;
pub mod source;

pub use client::{SolarWebClient, SolarWebError};
pub use error_codes::ErrorCodeCatalog;
pub use models::FlowData;
pub use source::SolarWebStatusSource;
