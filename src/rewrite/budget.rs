//! Thinking budget arithmetic.
//!
//! The budget must stay strictly below the hard cap, and the response-length
//! ceiling must stay strictly above the budget. Both rules are enforced here
//! so the JSON rewriter only has to decide which fields to touch.

/// A budget after clamping against the hard cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveBudget {
    /// Budget actually sent upstream.
    pub tokens: u64,
    /// Whether the requested value was lowered to fit.
    pub clamped: bool,
}

/// Clamp a requested budget to `hard_cap - 1`.
pub fn clamp_budget(requested: u64, hard_cap: u64) -> EffectiveBudget {
    let ceiling = hard_cap.saturating_sub(1);
    if requested > ceiling {
        EffectiveBudget {
            tokens: ceiling,
            clamped: true,
        }
    } else {
        EffectiveBudget {
            tokens: requested,
            clamped: false,
        }
    }
}

/// Smallest max-token value that leaves headroom above `budget`.
///
/// Headroom is a tenth of the budget, never less than `min_headroom`, and the
/// result never exceeds `hard_cap`.
pub fn required_max_tokens(budget: u64, hard_cap: u64, min_headroom: u64) -> u64 {
    let headroom = min_headroom.max(budget / 10);
    let desired = budget.saturating_add(headroom);
    let required = desired.min(hard_cap);
    if required <= budget {
        budget.saturating_add(1).min(hard_cap)
    } else {
        required
    }
}
