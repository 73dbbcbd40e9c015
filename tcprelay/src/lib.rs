pub mod config;
pub mod flow;
pub mod forward;
pub mod log;
pub mod socket;

pub use tokio;
