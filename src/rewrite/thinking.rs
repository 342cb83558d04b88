//! Model-name suffix rewriting.
//!
//! A request for `claude-sonnet-4-thinking-8000` becomes a request for
//! `claude-sonnet-4` carrying `"thinking": {"type": "enabled",
//! "budget_tokens": 8000}`, with the max-token ceiling lifted above the
//! budget. Anything that is not a JSON object POSTed for a matching model is
//! passed through byte-for-byte.

use bytes::Bytes;
use serde_json::{json, Map, Value};

use crate::config::ThinkingConfig;
use crate::observability::metrics;
use crate::rewrite::budget::{clamp_budget, required_max_tokens};

/// Outcome of inspecting one request body.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    /// Body to forward: rewritten, or the original bytes.
    pub body: Bytes,
    /// True when `body` differs from what the client sent.
    pub transformed: bool,
    /// Present only when a `thinking` block was added.
    pub directive: Option<ThinkingDirective>,
}

impl RewriteResult {
    fn unchanged(body: Bytes) -> Self {
        Self {
            body,
            transformed: false,
            directive: None,
        }
    }
}

/// The thinking block derived from a model suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingDirective {
    /// Budget written to `thinking.budget_tokens`.
    pub budget_tokens: u64,
    /// Budget the client asked for before clamping.
    pub requested_tokens: u64,
    /// Ceiling required above the budget. Larger existing values are kept.
    pub max_tokens: u64,
}

impl ThinkingDirective {
    pub fn clamped(&self) -> bool {
        self.budget_tokens != self.requested_tokens
    }
}

/// Rewrites request bodies according to a [`ThinkingConfig`].
#[derive(Debug, Clone)]
pub struct ThinkingRewriter {
    config: ThinkingConfig,
}

impl ThinkingRewriter {
    pub fn new(config: ThinkingConfig) -> Self {
        Self { config }
    }

    /// Inspect a request body and rewrite it when it asks for a thinking model.
    ///
    /// Never fails: bodies that cannot be rewritten are returned unchanged.
    pub fn rewrite(&self, method: &str, body: Bytes) -> RewriteResult {
        if method != "POST" || body.is_empty() {
            return RewriteResult::unchanged(body);
        }

        let mut object = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(object)) => object,
            _ => return RewriteResult::unchanged(body),
        };

        let model = match object.get("model") {
            Some(Value::String(model)) if model.starts_with(&self.config.model_prefix) => {
                model.clone()
            }
            _ => return RewriteResult::unchanged(body),
        };

        let Some(marker) = model.rfind(&self.config.suffix_marker) else {
            return RewriteResult::unchanged(body);
        };
        let clean_model = &model[..marker];
        let budget_text = &model[marker + self.config.suffix_marker.len()..];

        let model_changed = clean_model != model;
        object.insert("model".to_string(), Value::String(clean_model.to_string()));

        let directive = match parse_budget(budget_text) {
            Some(requested) => Some(self.apply_budget(&mut object, requested)),
            None => {
                tracing::warn!(
                    model = %model,
                    clean_model = %clean_model,
                    budget = %budget_text,
                    "Stripped thinking suffix with invalid budget"
                );
                metrics::record_rewrite("stripped");
                None
            }
        };

        if directive.is_none() && !model_changed {
            return RewriteResult::unchanged(body);
        }

        match serde_json::to_vec(&Value::Object(object)) {
            Ok(rewritten) => {
                if let Some(directive) = directive {
                    tracing::info!(
                        model = %clean_model,
                        budget_tokens = directive.budget_tokens,
                        max_tokens = directive.max_tokens,
                        "Applied thinking budget"
                    );
                }
                RewriteResult {
                    body: Bytes::from(rewritten),
                    transformed: true,
                    directive,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize rewritten body, forwarding original");
                RewriteResult::unchanged(body)
            }
        }
    }

    fn apply_budget(&self, object: &mut Map<String, Value>, requested: u64) -> ThinkingDirective {
        let cfg = &self.config;
        let budget = clamp_budget(requested, cfg.hard_cap);
        if budget.clamped {
            tracing::warn!(
                requested,
                effective = budget.tokens,
                hard_cap = cfg.hard_cap,
                "Clamped thinking budget"
            );
            metrics::record_rewrite("clamped");
        }
        metrics::record_rewrite("budget");

        object.insert(
            "thinking".to_string(),
            json!({ "type": "enabled", "budget_tokens": budget.tokens }),
        );

        let required = required_max_tokens(budget.tokens, cfg.hard_cap, cfg.min_headroom);
        let legacy = cfg.legacy_max_tokens_field.as_str();
        let current = cfg.current_max_tokens_field.as_str();
        let has_legacy = is_present(object, legacy);
        let has_current = is_present(object, current);

        for field in [legacy, current] {
            if let Some(value) = object.get_mut(field) {
                if at_most(value, budget.tokens) {
                    *value = Value::from(required);
                }
            }
        }

        if !has_legacy && !has_current {
            let field = if uses_field_name(object, current) {
                current
            } else {
                legacy
            };
            object.insert(field.to_string(), Value::from(required));
        }

        ThinkingDirective {
            budget_tokens: budget.tokens,
            requested_tokens: requested,
            max_tokens: required,
        }
    }
}

/// Parse a strictly positive integer budget.
fn parse_budget(text: &str) -> Option<u64> {
    text.parse::<u64>().ok().filter(|n| *n > 0)
}

/// A field set to `null` is treated as absent.
fn is_present(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).is_some_and(|v| !v.is_null())
}

/// Whether a numeric JSON value is `<= budget`. Non-numbers are left alone.
fn at_most(value: &Value, budget: u64) -> bool {
    if let Some(n) = value.as_u64() {
        n <= budget
    } else if value.as_i64().is_some() {
        // Negative.
        true
    } else if let Some(f) = value.as_f64() {
        f <= budget as f64
    } else {
        false
    }
}

/// Whether `name` is used as a key anywhere below the top level.
fn uses_field_name(object: &Map<String, Value>, name: &str) -> bool {
    fn contains_key(value: &Value, name: &str) -> bool {
        match value {
            Value::Object(map) => map
                .iter()
                .any(|(k, v)| k == name || contains_key(v, name)),
            Value::Array(items) => items.iter().any(|v| contains_key(v, name)),
            _ => false,
        }
    }
    object.values().any(|v| contains_key(v, name))
}
