pub mod protocol;
pub mod server;

pub use server::{AdvisorConfig, AdvisorServer, DEFAULT_HTTP_ADDR};
