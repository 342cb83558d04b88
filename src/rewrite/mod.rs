//! Request body rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! complete IncomingRequest (method + body)
//!     → thinking.rs (POST? JSON object? matching model? marker?)
//!         → budget.rs (clamp to hard cap, derive max-token ceiling)
//!     → RewriteResult { body, transformed }
//!     → forwarder recomputes Content-Length from the new body
//! ```
//!
//! # Design Decisions
//! - Rewriting never fails a request; anything unexpected passes through
//! - Policy values come from ThinkingConfig, injected at construction

pub mod budget;
pub mod thinking;

pub use thinking::{RewriteResult, ThinkingDirective, ThinkingRewriter};
