use core::fmt;

/// A bounded set of small integers, stored as a bit vector.
///
/// The set can hold the values `0..WORDS * 32`. Values beyond that are never members, so
/// inserting them is refused and removing them is a no-op.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdBitmap<const WORDS: usize> {
    words: [u32; WORDS],
}
impl<const WORDS: usize> IdBitmap<WORDS> {
    /// The number of distinct values this set can hold.
    pub const CAPACITY: usize = WORDS * u32::BITS as usize;

    /// Create an empty set.
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }
    const fn position(id: usize) -> (usize, u32) {
        (id / u32::BITS as usize, 1 << (id % u32::BITS as usize))
    }
    /// Add `id` to the set.
    ///
    /// Returns `true`, if the id wasn't present before.
    pub fn insert(&mut self, id: usize) -> bool {
        let (word, mask) = Self::position(id);
        let Some(word) = self.words.get_mut(word) else {
            return false;
        };
        let newly_inserted = *word & mask == 0;
        *word |= mask;
        newly_inserted
    }
    /// Remove `id` from the set.
    ///
    /// Returns `true`, if the id was present.
    pub fn remove(&mut self, id: usize) -> bool {
        let (word, mask) = Self::position(id);
        let Some(word) = self.words.get_mut(word) else {
            return false;
        };
        let was_present = *word & mask != 0;
        *word &= !mask;
        was_present
    }
    pub fn contains(&self, id: usize) -> bool {
        let (word, mask) = Self::position(id);
        self.words.get(word).is_some_and(|word| word & mask != 0)
    }
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }
    /// The number of ids in the set.
    pub fn len(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }
    pub fn clear(&mut self) {
        self.words = [0; WORDS];
    }
    /// Check that no id is a member of both sets.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }
    /// Iterate over the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(index, word)| {
                let mut remaining = *word;
                core::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let bit = remaining.trailing_zeros();
                    // We mask away the bit we just yielded.
                    remaining &= !(1 << bit);
                    Some(index * u32::BITS as usize + bit as usize)
                })
            })
    }
}
impl<const WORDS: usize> Default for IdBitmap<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}
impl<const WORDS: usize> fmt::Debug for IdBitmap<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
#[cfg(feature = "defmt")]
impl<const WORDS: usize> defmt::Format for IdBitmap<WORDS> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "IdBitmap {{ len: {} }}", self.len())
    }
}
