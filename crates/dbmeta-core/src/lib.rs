//! Core types for dbmeta
//!
//! This crate provides the shared error type and the environment-driven
//! configuration used by every other dbmeta crate.

pub mod config;
pub mod error;

// Re-exports
pub use config::{
    AuditConfig, AuditFormat, DatabaseConfig, DbMetaConfig, LimitsConfig, LogFormat,
    LoggingConfig,
};
pub use error::{Error, Result, panic_message};
