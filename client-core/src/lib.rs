//! client-core: Shared infrastructure for the assistant client crates.
pub mod config;
pub mod error;
pub mod observability;
pub mod retry;
pub mod timer;

pub use error::ClientError;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tokio_util;
pub use tracing;
pub use validator;
