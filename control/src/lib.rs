pub mod certs;
pub mod config;
pub mod embedded;
pub mod error;
pub mod host;
pub mod metadata;
pub mod registry;
pub mod status;
pub mod store;
pub mod types;
pub mod workflow;

pub use error::{ControlPlaneError, Result};
