//! Local intercepting proxy that turns `-thinking-<N>` model suffixes into an
//! explicit thinking budget before handing requests to the backend.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod rewrite;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::RunState;
pub use rewrite::{RewriteResult, ThinkingRewriter};
