//! Kiln - lock-file restore engine
//!
//! Resolves project references recorded in a lock file and restores
//! packages over HTTP through a disk cache that concurrent processes can
//! share safely.

pub mod cli;
pub mod config;
pub mod error;
pub mod fslock;
pub mod http;
pub mod lockfile;
pub mod project;
pub mod resolver;
pub mod restore;

pub use error::{KilnError, KilnResult};
