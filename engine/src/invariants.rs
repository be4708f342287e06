//! Structured reports for broken tree invariants.
//!
//! Every tree exposes a `check_invariants` method that walks the whole
//! structure and returns the first violation it finds. The simulator and the
//! unit tests call it after each operation.

/// A violated structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Where it was detected (node id, position or path).
    pub context: String,
}

impl InvariantViolation {
    /// Create a violation with the given description and location.
    #[must_use]
    pub fn new(description: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: context.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.description)
        } else {
            write!(f, "{} ({})", self.description, self.context)
        }
    }
}

impl std::error::Error for InvariantViolation {}

/// Return a violation unless `condition` holds.
pub(crate) fn ensure(
    condition: bool,
    description: impl Into<String>,
    context: impl FnOnce() -> String,
) -> Result<(), InvariantViolation> {
    if condition {
        Ok(())
    } else {
        Err(InvariantViolation::new(description, context()))
    }
}

/// Check that a key sequence is strictly ascending.
pub(crate) fn ensure_strictly_ascending<K: Ord>(
    keys: &[K],
    context: impl FnOnce() -> String,
) -> Result<(), InvariantViolation> {
    ensure(
        keys.windows(2).all(|pair| pair[0] < pair[1]),
        "keys are not strictly ascending",
        context,
    )
}

/// Check that every key lies within the half-open routing range
/// `[lower, upper)` inherited from the ancestors.
pub(crate) fn ensure_within_bounds<K: Ord>(
    keys: &[K],
    lower: Option<&K>,
    upper: Option<&K>,
    context: impl FnOnce() -> String,
) -> Result<(), InvariantViolation> {
    let in_range = keys.iter().all(|key| {
        lower.is_none_or(|lower| key >= lower) && upper.is_none_or(|upper| key < upper)
    });
    ensure(in_range, "key outside the range routed by its ancestors", context)
}
