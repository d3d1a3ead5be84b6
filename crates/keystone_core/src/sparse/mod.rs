//! # Sparse Indexing Primitives
//!
//! O(1) membership and lookup structures built from two arrays:
//!
//! ```text
//! sparse: [_, _, 0, _, _, 1, _]   <- indexed by idx(value), holds dense position
//! dense:  [v2, v5]                <- packed, no gaps, iteration order
//! ```
//!
//! - Insert appends to `dense` and records the position in `sparse`
//! - Erase swaps with the last dense element and pops (order not preserved)
//! - Lookups validate the sparse entry against the dense slot, so stale
//!   sparse entries never need clearing

mod map;
mod set;

pub use map::SparseMap;
pub use set::SparseSet;

use crate::error::{RegistryError, RegistryResult};

/// Hard upper bound for the length of a sparse index array.
pub const MAX_SPARSE_LEN: usize = isize::MAX as usize / std::mem::size_of::<usize>();

/// Maps a value to the slot it occupies in a sparse index array.
///
/// The range of the function may be unbounded; lookups with an index past
/// the end of the sparse array simply report "not found".
pub trait SparseIndexer<V> {
    /// Returns the sparse slot for `value`.
    fn index(&self, value: &V) -> usize;
}

/// Identity indexer for unsigned integers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnsignedIndexer;

macro_rules! impl_unsigned_indexer {
    ($($ty:ty),*) => {
        $(
            impl SparseIndexer<$ty> for UnsignedIndexer {
                #[inline]
                #[allow(clippy::cast_possible_truncation)]
                fn index(&self, value: &$ty) -> usize {
                    *value as usize
                }
            }
        )*
    };
}

impl_unsigned_indexer!(u8, u16, u32, u64, usize);

/// Computes the next size for a growable array.
///
/// Doubles `current`, never returns less than `min`, and clamps to `max`
/// once doubling would overshoot it.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidCapacityRange`] if `min > max`.
pub fn next_capacity_size(current: usize, min: usize, max: usize) -> RegistryResult<usize> {
    if min > max {
        return Err(RegistryError::InvalidCapacityRange { min, max });
    }
    if current >= max / 2 {
        return Ok(max);
    }
    Ok((current * 2).max(min))
}
