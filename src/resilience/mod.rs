//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request accumulation, backend connect, relay reads:
//!     → timeouts.rs (optional deadline per operation)
//!     → on expiry the connection is torn down (502 if nothing was relayed)
//! ```
//!
//! # Design Decisions
//! - No retries: the backend's status codes already report failure, and the
//!   client owns any retry policy

pub mod timeouts;
