pub mod classify;
pub mod severity;
pub mod status;

pub use classify::{classify, Classification, ErrorCatalog, ErrorColour, ErrorMessage, Observation};
pub use severity::{resolve, try_resolve};
pub use status::{ParseStatusError, StatusRecord, SystemStatus};
