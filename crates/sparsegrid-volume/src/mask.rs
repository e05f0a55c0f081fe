//! Fixed-size bitmask over a node's voxel table.

use serde::{Deserialize, Serialize};

/// One bit per table slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeMask {
    len: u64,
    words: Vec<u64>,
}

impl NodeMask {
    /// Create an all-off mask of `len` bits.
    pub fn new(len: u64) -> Self {
        Self {
            len,
            words: vec![0; len.div_ceil(64) as usize],
        }
    }

    /// Number of bits.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for a zero-length mask.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Test bit `index`. Out-of-range bits read as off.
    #[inline]
    pub fn is_on(&self, index: u64) -> bool {
        index < self.len && (self.words[(index >> 6) as usize] >> (index & 63)) & 1 == 1
    }

    /// Set or clear bit `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set(&mut self, index: u64, on: bool) {
        assert!(index < self.len, "mask index {index} out of range {}", self.len);
        let word = &mut self.words[(index >> 6) as usize];
        let bit = 1u64 << (index & 63);
        if on {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    /// Set every bit.
    pub fn fill(&mut self) {
        self.words.fill(u64::MAX);
        let tail = self.len & 63;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
    }

    /// Number of set bits.
    pub fn count_on(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Indices of set bits, ascending.
    pub fn iter_on(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let base = (i as u64) << 6;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let offset = u64::from(bits.trailing_zeros());
                bits &= bits - 1;
                Some(base + offset)
            })
        })
    }

    /// Returns true if the stored words agree with the bit length.
    pub(crate) fn is_well_formed(&self) -> bool {
        if self.words.len() as u64 != self.len.div_ceil(64) {
            return false;
        }
        let tail = self.len & 63;
        tail == 0 || self.words.last().map_or(true, |last| last >> tail == 0)
    }
}
