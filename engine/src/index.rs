//! The operation surface shared by every tree variant.
//!
//! All three trees (B+-tree, in-memory classic, disk-resident classic) answer
//! the same four point operations. In-memory trees never fail and use
//! [`Infallible`](std::convert::Infallible) as their error type; the disk tree
//! surfaces storage failures.

use crate::invariants::InvariantViolation;

/// Smallest order accepted by any tree.
///
/// Order 1 would leave the B+-tree without an overflow buffer and allow
/// non-root nodes with zero keys.
pub const MIN_ORDER: usize = 2;

/// An ordered key-to-value index.
pub trait KeyValueIndex<K, V> {
    /// Error raised by the backing storage.
    type Error: std::error::Error;

    /// Insert a key-value pair.
    ///
    /// Returns the previous value if the key was already present; the old
    /// value is overwritten.
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Self::Error>;

    /// Remove a key. Returns `false` if the key was absent.
    fn remove(&mut self, key: &K) -> Result<bool, Self::Error>;

    /// Look up a value by key.
    fn search(&mut self, key: &K) -> Result<Option<V>, Self::Error>;

    /// Check whether a key is present.
    fn contains(&mut self, key: &K) -> Result<bool, Self::Error> {
        Ok(self.search(key)?.is_some())
    }

    /// Number of entries in the index.
    fn len(&self) -> usize;

    /// Whether the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verify the structural invariants of the tree.
    fn check_invariants(&mut self) -> Result<(), InvariantViolation>;
}

/// Error returned when a tree is constructed with an unusable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderError {
    /// The rejected order.
    pub order: usize,
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "order {} is too small (minimum is {MIN_ORDER})",
            self.order
        )
    }
}

impl std::error::Error for OrderError {}

/// Validate a tree order.
pub const fn check_order(order: usize) -> Result<usize, OrderError> {
    if order < MIN_ORDER {
        return Err(OrderError { order });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_order() {
        assert_eq!(check_order(2), Ok(2));
        assert_eq!(check_order(32), Ok(32));
        assert_eq!(check_order(1), Err(OrderError { order: 1 }));
        assert_eq!(check_order(0), Err(OrderError { order: 0 }));
    }

    #[test]
    fn test_order_error_display() {
        assert_eq!(
            OrderError { order: 1 }.to_string(),
            "order 1 is too small (minimum is 2)"
        );
    }
}
