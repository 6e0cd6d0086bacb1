/// An array of dynamically sized bit arrays.
///
/// Used by the grid broad phase to store one bit per object for every column and row.
#[derive(Clone, Debug, Default)]
pub struct BitMatrix {
    entry_size: usize,
    entry_count: usize,
    bits: Vec<u64>,
}

impl BitMatrix {
    /// Clear every bit and resize to hold `entry_count` entries of `bits_per_entry` bits.
    /// Allocated memory is reused when possible.
    pub fn reset(&mut self, entry_count: usize, bits_per_entry: usize) {
        self.entry_size = words_for(bits_per_entry);
        self.entry_count = entry_count;
        self.bits.clear();
        self.bits.resize(self.entry_size * self.entry_count, 0);
    }

    pub fn entry(&self, idx: usize) -> &[u64] {
        let start = idx * self.entry_size;
        &self.bits[start..start + self.entry_size]
    }

    /// Set bit `bit` of entry `idx`.
    ///
    /// # Panics
    /// Panics if either index is outside the matrix.
    pub fn set(&mut self, idx: usize, bit: usize) {
        let start = idx * self.entry_size;
        let entry = &mut self.bits[start..start + self.entry_size];
        entry[bit / 64] |= 1_u64 << (bit % 64);
    }

    /// Write the union of a range of entries into `out`.
    pub fn union_into(&self, entries: std::ops::RangeInclusive<usize>, out: &mut Vec<u64>) {
        out.clear();
        out.resize(self.entry_size, 0);
        for idx in entries {
            for (o, word) in out.iter_mut().zip(self.entry(idx)) {
                *o |= word;
            }
        }
    }
}

#[inline]
fn words_for(bits: usize) -> usize {
    bits / 64 + 1
}

/// Iterate over the indices of set bits in a bitset.
pub fn iter_ones(words: &[u64]) -> impl '_ + Iterator<Item = usize> {
    words.iter().enumerate().flat_map(|(word_idx, &word)| {
        // copy each word so we can remove bits from it as we go
        let mut curr_word = word;
        std::iter::from_fn(move || {
            if curr_word == 0 {
                return None;
            }
            let first_bit_idx = curr_word.trailing_zeros();
            curr_word ^= 1 << first_bit_idx;
            Some(word_idx * 64 + first_bit_idx as usize)
        })
    })
}

//
// tests
//
