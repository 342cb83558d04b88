//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every default matches the values the proxy ships with, so an empty file
//! (or no file at all) yields a working setup.

use serde::{Deserialize, Serialize};

/// Root configuration for the thinking proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Front-facing listener configuration.
    pub listener: ListenerConfig,

    /// Downstream model-routing service.
    pub backend: BackendConfig,

    /// Model-name suffix rewriting policy.
    pub thinking: ThinkingConfig,

    /// Framing and buffering limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (loopback only in the default setup).
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8317".to_string(),
            max_connections: 1024,
        }
    }
}

/// Backend service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "127.0.0.1:8318").
    pub address: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8318".to_string(),
        }
    }
}

/// Policy for turning `-thinking-<N>` model suffixes into a `thinking` block.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ThinkingConfig {
    /// Only models starting with this prefix are inspected.
    pub model_prefix: String,

    /// Marker separating the clean model name from the budget.
    pub suffix_marker: String,

    /// Ceiling for both the budget (exclusive) and the max-token field.
    pub hard_cap: u64,

    /// Minimum gap kept between the budget and the max-token field.
    pub min_headroom: u64,

    /// Older name of the response-length ceiling field.
    pub legacy_max_tokens_field: String,

    /// Newer name of the response-length ceiling field.
    pub current_max_tokens_field: String,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            model_prefix: "claude-".to_string(),
            suffix_marker: "-thinking-".to_string(),
            hard_cap: 32_000,
            min_headroom: 1024,
            legacy_max_tokens_field: "max_tokens".to_string(),
            current_max_tokens_field: "max_output_tokens".to_string(),
        }
    }
}

/// Request framing and relay limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request head accepted before a separator must appear.
    pub max_header_bytes: usize,

    /// Maximum number of request headers.
    pub max_headers: usize,

    /// Read size for each backend response chunk.
    pub relay_chunk_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_headers: 128,
            relay_chunk_size: 64 * 1024,
        }
    }
}

/// Timeout configuration. A value of `0` disables the corresponding deadline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for receiving a complete request, in seconds.
    pub request_read_secs: u64,

    /// Maximum wait for the next backend response chunk, in seconds.
    pub relay_idle_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_read_secs: 0,
            relay_idle_secs: 0,
            drain_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9317".to_string(),
        }
    }
}
