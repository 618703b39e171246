//! Shared service plumbing
//!
//! Provides the pieces every service binary needs:
//! - logging bootstrap with runtime level changes
//! - layered configuration loading
//! - graceful shutdown signalling

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{Error, Result};
