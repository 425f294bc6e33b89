//! Double-buffered Bloom filter used to drop repeated (client, page) observations.

use std::fmt;

use bloomfilter::Bloom;

use crate::ConfigError;

/// Two generations of Bloom filter over 64-bit observation keys.
///
/// Only the current generation answers [`DoubleBufferFilter::test_and_add`]. On
/// rotation the current generation is retained as `previous` and the buffer that
/// held the generation before it is wiped and reused, so rotating never allocates.
/// Inserting more keys than the filter was sized for raises the false positive
/// rate rather than failing.
pub(crate) struct DoubleBufferFilter {
    current: Bloom<u64>,
    previous: Bloom<u64>,
}

impl DoubleBufferFilter {
    /// Sizes both generations for `capacity` keys at `false_positive_rate`.
    pub(crate) fn new(capacity: usize, false_positive_rate: f64) -> Result<Self, ConfigError> {
        let generation = || {
            Bloom::new_for_fp_rate(capacity, false_positive_rate)
                .map_err(|_| ConfigError::InvalidFalsePositiveRate(false_positive_rate))
        };
        Ok(Self {
            current: generation()?,
            previous: generation()?,
        })
    }

    /// Returns `true` if `key` was already present in the current generation,
    /// otherwise records it and returns `false`.
    pub(crate) fn test_and_add(&mut self, key: u64) -> bool {
        if self.current.check(&key) {
            return true;
        }
        self.current.set(&key);
        false
    }

    /// Starts a new, empty generation.
    pub(crate) fn rotate(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();
    }

    /// Whether `key` was seen in the generation before the current one.
    #[cfg(test)]
    pub(crate) fn seen_previously(&self, key: u64) -> bool {
        self.previous.check(&key)
    }
}

impl fmt::Debug for DoubleBufferFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleBufferFilter")
            .field("bits", &self.current.len())
            .field("hashes", &self.current.number_of_hash_functions())
            .finish()
    }
}
