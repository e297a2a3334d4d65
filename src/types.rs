//! Type-safe wrappers for LP columns and recurrent-regime bit-patterns.
//!
//! Newtypes keep solver column indices and bit-pattern identifiers
//! apart at compile time when wiring the encoder to the solver.

use std::fmt;

/// A solver column index.
///
/// Columns are assigned by [`VarIndex`][crate::index::VarIndex] and form a
/// disjoint partition over the three variable families (x, y, z).
///
/// # Invariants
///
/// - Defined columns are dense: `0..num_cols`.
/// - Undefined combinations (e.g. an occupation-measure variable for a
///   state outside every MEC) map to [`Col::UNDEFINED`], never panic.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Col(usize);

impl Col {
    /// Sentinel for combinations with no column.
    pub const UNDEFINED: Col = Col(usize::MAX);

    /// Creates a defined column with the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index == usize::MAX`, which is reserved for the sentinel.
    pub fn new(index: usize) -> Self {
        assert_ne!(index, usize::MAX, "Column index is reserved for the sentinel");
        Col(index)
    }

    /// Checks whether this column is defined.
    pub fn is_defined(self) -> bool {
        self.0 != usize::MAX
    }

    /// Returns the raw column index.
    ///
    /// # Panics
    ///
    /// Panics if the column is the sentinel.
    pub fn index(self) -> usize {
        assert!(self.is_defined(), "Column is undefined");
        self.0
    }

    /// Returns the raw column index, or `None` for the sentinel.
    pub fn get(self) -> Option<usize> {
        if self.is_defined() {
            Some(self.0)
        } else {
            None
        }
    }
}

impl fmt::Display for Col {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(f, "c{}", self.0)
        } else {
            write!(f, "c#")
        }
    }
}

/// A recurrent-regime bit-pattern over the probabilistic constraints.
///
/// Bit `i` states that the regime claims to satisfy probabilistic
/// constraint `i`. The valid range of patterns is determined by
/// [`PatternSpace`][crate::query::PatternSpace].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BitPattern(u32);

impl BitPattern {
    /// The pattern claiming no constraint.
    pub const EMPTY: BitPattern = BitPattern(0);

    /// Creates a pattern from its raw bitmask.
    pub fn new(raw: u32) -> Self {
        BitPattern(raw)
    }

    /// Returns the raw bitmask.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Checks whether bit `i` is set.
    pub fn bit(self, i: usize) -> bool {
        assert!(i < 32, "Bit index out of range");
        self.0 & (1 << i) != 0
    }

    /// The all-bits-set pattern for the given width.
    pub fn full(bits: u32) -> Self {
        assert!(bits < 32, "Pattern width out of range");
        BitPattern(((1u64 << bits) - 1) as u32)
    }
}

impl fmt::Display for BitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{:b}", self.0)
    }
}

impl From<BitPattern> for u32 {
    fn from(pattern: BitPattern) -> Self {
        pattern.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_defined() {
        let c0 = Col::new(0);
        let c5 = Col::new(5);
        assert!(c0.is_defined());
        assert_eq!(c5.index(), 5);
        assert_eq!(c5.get(), Some(5));
        assert!(c0 < c5);
    }

    #[test]
    fn test_col_sentinel() {
        assert!(!Col::UNDEFINED.is_defined());
        assert_eq!(Col::UNDEFINED.get(), None);
    }

    #[test]
    #[should_panic(expected = "Column is undefined")]
    fn test_col_sentinel_index_panics() {
        Col::UNDEFINED.index();
    }

    #[test]
    fn test_pattern_bits() {
        let n = BitPattern::new(0b101);
        assert!(n.bit(0));
        assert!(!n.bit(1));
        assert!(n.bit(2));
        assert_eq!(n.raw(), 5);
    }

    #[test]
    fn test_pattern_full() {
        assert_eq!(BitPattern::full(0), BitPattern::EMPTY);
        assert_eq!(BitPattern::full(1).raw(), 0b1);
        assert_eq!(BitPattern::full(3).raw(), 0b111);
    }
}
