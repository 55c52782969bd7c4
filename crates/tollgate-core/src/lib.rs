//! Core types, configuration, and state management for Tollgate.
//!
//! This crate provides the building blocks shared by the authentication and
//! authorization crates: the process configuration, the module and consumer
//! identifiers, and a concurrent store that partitions state per
//! (module, consumer) pair.

mod config;
mod error;
mod state;
mod types;

pub use config::TollgateConfig;
pub use error::{TollgateError, TollgateResult};
pub use state::ModuleConsumerStore;
pub use types::{ConsumerKey, ModuleName};
