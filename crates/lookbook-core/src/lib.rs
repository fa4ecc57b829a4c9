//! Shared vocabulary of the lookbook search core: domain types, capability
//! traits, the error taxonomy, configuration, and guarded external calls.

#![deny(unused_imports)]

pub mod call;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
