pub mod generate;
pub mod store;

pub use generate::generate_tls_bundle;
pub use store::{load, save};
