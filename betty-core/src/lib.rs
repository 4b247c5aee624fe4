//! betty-core: Shared infrastructure for the Betty chat client crates.
pub mod auth;
pub mod config;
pub mod error;
pub mod observability;
pub mod retry;

pub use async_trait;
pub use secrecy;
pub use tracing;
