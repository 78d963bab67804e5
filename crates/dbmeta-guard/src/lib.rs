//! Admission guards for dbmeta tool calls
//!
//! Every call passes through these in order before touching the catalog:
//! - identifier validation
//! - fixed-window rate limiting
//! - the concurrency gate bounding simultaneous catalog sessions

pub mod concurrency;
pub mod rate_limiter;
pub mod validation;

// Re-exports
pub use concurrency::{ConcurrencyGate, GateClosed, GatePermit};
pub use rate_limiter::{RateLimitExceeded, RateLimiter};
pub use validation::{IdentifierKind, IdentifierValidator, ValidationError};
