// Fixed-capacity byte buffer with a presence bitmap.
//
// Positions start out unset. A position becomes defined once written and
// stays defined; the buffer never grows past the capacity it was created
// with.

use crate::hex::BlockContents;

const WORD_BITS: usize = u64::BITS as usize;

/// Sparse byte storage for one memory region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseBuffer {
    bytes: Vec<u8>,
    present: Vec<u64>,
}

impl SparseBuffer {
    /// Create a buffer of `capacity` unset positions.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            present: vec![0; capacity.div_ceil(WORD_BITS)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The byte at `index`, or `None` when unset or out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.bytes.len() && self.is_set(index) {
            Some(self.bytes[index])
        } else {
            None
        }
    }

    /// Store `byte` at `index`. Returns `false` if `index` is out of range.
    #[inline]
    pub fn set(&mut self, index: usize, byte: u8) -> bool {
        if index >= self.bytes.len() {
            return false;
        }
        self.bytes[index] = byte;
        self.present[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        true
    }

    /// Store `bytes` starting at `index`. Nothing is written unless the whole
    /// run fits.
    pub fn set_slice(&mut self, index: usize, bytes: &[u8]) -> bool {
        match index.checked_add(bytes.len()) {
            Some(end) if end <= self.bytes.len() => {
                for (i, &b) in bytes.iter().enumerate() {
                    self.set(index + i, b);
                }
                true
            }
            _ => false,
        }
    }

    /// Number of defined positions.
    pub fn defined_count(&self) -> usize {
        self.present.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate every position in order.
    pub fn iter(&self) -> impl Iterator<Item = Option<u8>> + '_ {
        (0..self.bytes.len()).map(|i| self.get(i))
    }

    #[inline]
    fn is_set(&self, index: usize) -> bool {
        self.present[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }
}

impl BlockContents for SparseBuffer {
    fn len(&self) -> usize {
        self.capacity()
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.get(index)
    }
}
