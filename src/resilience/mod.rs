//! Failure handling for batch scans.
//!
//! - [`policy`]: turns a [`ScanError`](crate::error::ScanError) into a
//!   continue/retry/skip/fail decision with a log severity
//! - [`executor`]: drives an operation through the policy, sleeping between
//!   retries with exponential backoff
//! - [`circuit_breaker`]: fails fast once an operation keeps failing
//!
//! The scan service nests them as `executor(breaker(parse))`, so a breaker
//! rejection is itself a failure the policy sees.

pub mod circuit_breaker;
pub mod executor;
pub mod policy;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use executor::ResilientExecutor;
pub use policy::{DefaultErrorPolicy, ErrorAction, ErrorHandlingPolicy, ErrorHandlingResult, Severity};
