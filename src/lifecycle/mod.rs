//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start():
//!     bind listener → publish Running → spawn accept loop
//!
//! stop() / Ctrl+C:
//!     trigger Shutdown → accept loop exits, port released → publish Stopped
//!     → in-flight connections finish on their own (binary drains them)
//! ```
//!
//! # Design Decisions
//! - Run state is observable through a watch channel (poll or await)
//! - Stopping never aborts in-flight connections

pub mod shutdown;
pub mod state;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use state::{RunState, StateCell};
