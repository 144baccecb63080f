//! Sets of row identifiers.
//!
//! A [`RowSet`] is the currency of index combination: every index scan produces
//! one, and the BitSet operators in [`crate::action::bitset`] fold them together
//! with `&`, `|`, `-` and `^`. The representation is a roaring bitmap, which
//! keeps both dense runs and sparse scatters compact.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Sub, SubAssign};

// used for internal result sets
use roaring::RoaringBitmap;
// row sets travel inside archived variables as plain id lists
use serde::{Deserialize, Serialize};

/// Row identifiers are non-negative 32-bit integers.
pub type RowId = u32;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RowId>", into = "Vec<RowId>")]
pub struct RowSet {
    bits: RoaringBitmap,
}

impl RowSet {
    pub fn new() -> Self {
        Self { bits: RoaringBitmap::new() }
    }
    /// Sets a single bit, returning false if it was already set.
    pub fn insert(&mut self, row: RowId) -> bool {
        self.bits.insert(row)
    }
    pub fn remove(&mut self, row: RowId) -> bool {
        self.bits.remove(row)
    }
    pub fn contains(&self, row: RowId) -> bool {
        self.bits.contains(row)
    }
    pub fn any(&self) -> bool {
        !self.bits.is_empty()
    }
    pub fn none(&self) -> bool {
        self.bits.is_empty()
    }
    pub fn len(&self) -> u64 {
        self.bits.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
    pub fn clear(&mut self) {
        self.bits.clear();
    }
    pub fn min(&self) -> Option<RowId> {
        self.bits.min()
    }
    pub fn max(&self) -> Option<RowId> {
        self.bits.max()
    }
    /// Ascending iteration over the members.
    pub fn iter(&self) -> impl Iterator<Item = RowId> + '_ {
        self.bits.iter()
    }
    pub fn to_vec(&self) -> Vec<RowId> {
        self.bits.iter().collect()
    }
}

/// Owning ascending cursor, used by scans that snapshot a set when they open.
pub struct RowCursor {
    inner: roaring::bitmap::IntoIter,
}

impl Iterator for RowCursor {
    type Item = RowId;
    fn next(&mut self) -> Option<RowId> {
        self.inner.next()
    }
}

impl fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("RowCursor")
    }
}

impl IntoIterator for RowSet {
    type Item = RowId;
    type IntoIter = RowCursor;
    fn into_iter(self) -> RowCursor {
        RowCursor { inner: self.bits.into_iter() }
    }
}

impl FromIterator<RowId> for RowSet {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self { bits: iter.into_iter().collect() }
    }
}

impl From<Vec<RowId>> for RowSet {
    fn from(rows: Vec<RowId>) -> Self {
        rows.into_iter().collect()
    }
}

impl From<RowSet> for Vec<RowId> {
    fn from(set: RowSet) -> Self {
        set.to_vec()
    }
}

impl<const N: usize> From<[RowId; N]> for RowSet {
    fn from(rows: [RowId; N]) -> Self {
        rows.into_iter().collect()
    }
}

impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.bits.iter()).finish()
    }
}

impl fmt::Display for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, row) in self.bits.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", row)?;
        }
        write!(f, "}}")
    }
}

// ------------- Algebra -------------
// Binary operators borrow both operands and yield a fresh set; the assigning
// forms mutate the left operand in place.
macro_rules! set_operator {
    ($op:ident, $method:ident, $assign:ident, $assign_method:ident) => {
        impl $op<&RowSet> for &RowSet {
            type Output = RowSet;
            fn $method(self, other: &RowSet) -> RowSet {
                RowSet { bits: $op::$method(&self.bits, &other.bits) }
            }
        }
        impl $assign<&RowSet> for RowSet {
            fn $assign_method(&mut self, other: &RowSet) {
                $assign::$assign_method(&mut self.bits, &other.bits);
            }
        }
    };
}

set_operator!(BitAnd, bitand, BitAndAssign, bitand_assign);
set_operator!(BitOr, bitor, BitOrAssign, bitor_assign);
set_operator!(Sub, sub, SubAssign, sub_assign);
set_operator!(BitXor, bitxor, BitXorAssign, bitxor_assign);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_leave_operands_untouched() {
        let r = RowSet::from([1, 2, 3]);
        let m = RowSet::from([2, 3, 4]);
        assert_eq!((&r & &m).to_vec(), vec![2, 3]);
        assert_eq!((&r | &m).to_vec(), vec![1, 2, 3, 4]);
        assert_eq!((&r - &m).to_vec(), vec![1]);
        assert_eq!((&r ^ &m).to_vec(), vec![1, 4]);
        assert_eq!(r.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn cursor_is_ascending() {
        let set: RowSet = [9, 1, 5].into_iter().collect();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 5, 9]);
        assert_eq!(RowSet::from([7]).to_string(), "{7}");
    }
}
