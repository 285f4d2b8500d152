pub mod client;
pub mod error;
pub mod metrics;
pub mod types;
mod url;
