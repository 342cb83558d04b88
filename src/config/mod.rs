//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → moved into ProxyServer, shared via Arc with connection tasks
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    ThinkingConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
