//! # plughost-core
//!
//! Core crate for plughost. Contains the unified error system and the
//! configuration schemas shared by the plugin runtime and the host binary.
//!
//! This crate has **no** internal dependencies on other plughost crates.

pub mod config;
pub mod error;
pub mod result;

pub use config::HostConfig;
pub use error::{AppError, ErrorKind};
pub use result::AppResult;
