//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that addresses parse and do not loop back onto the listener
//! - Validate value ranges for the budget policy and limits
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("listener and backend share the address {0}")]
    BackendLoop(String),

    #[error("{field}: {reason}")]
    OutOfRange { field: &'static str, reason: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("thinking.legacy_max_tokens_field and thinking.current_max_tokens_field are both {0:?}")]
    DuplicateField(String),

    #[error("observability.log_format: expected \"pretty\" or \"json\", got {0:?}")]
    LogFormat(String),
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = parse_addr("listener.bind_address", &config.listener.bind_address, &mut errors);
    let backend = parse_addr("backend.address", &config.backend.address, &mut errors);
    if config.observability.metrics_enabled {
        parse_addr(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if let (Some(listener), Some(backend)) = (listener, backend) {
        // Port 0 picks a fresh port, so it can never collide.
        if listener == backend && listener.port() != 0 {
            errors.push(ValidationError::BackendLoop(listener.to_string()));
        }
    }

    let thinking = &config.thinking;
    if thinking.hard_cap < 2 {
        errors.push(ValidationError::OutOfRange {
            field: "thinking.hard_cap",
            reason: format!("must be at least 2, got {}", thinking.hard_cap),
        });
    }
    if thinking.min_headroom == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "thinking.min_headroom",
            reason: "must be at least 1".to_string(),
        });
    }
    if thinking.model_prefix.is_empty() {
        errors.push(ValidationError::Empty("thinking.model_prefix"));
    }
    if thinking.suffix_marker.is_empty() {
        errors.push(ValidationError::Empty("thinking.suffix_marker"));
    }
    if thinking.legacy_max_tokens_field.is_empty() {
        errors.push(ValidationError::Empty("thinking.legacy_max_tokens_field"));
    }
    if thinking.current_max_tokens_field.is_empty() {
        errors.push(ValidationError::Empty("thinking.current_max_tokens_field"));
    }
    if !thinking.legacy_max_tokens_field.is_empty()
        && thinking.legacy_max_tokens_field == thinking.current_max_tokens_field
    {
        errors.push(ValidationError::DuplicateField(
            thinking.legacy_max_tokens_field.clone(),
        ));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "listener.max_connections",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.limits.relay_chunk_size == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "limits.relay_chunk_size",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.limits.max_header_bytes < 1024 {
        errors.push(ValidationError::OutOfRange {
            field: "limits.max_header_bytes",
            reason: format!("must be at least 1024, got {}", config.limits.max_header_bytes),
        });
    }
    if config.limits.max_headers == 0 {
        errors.push(ValidationError::OutOfRange {
            field: "limits.max_headers",
            reason: "must be at least 1".to_string(),
        });
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::LogFormat(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_addr(
    field: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            });
            None
        }
    }
}
