//! Membership filter (C4) — per-file probabilistic set membership.
//!
//! Wraps [`bloomfilter::Bloom`] behind a narrow contract: `add`, `contains`,
//! and deterministic (de)serialization. An SST reader consults the filter as
//! a negative fast-path before touching its sparse index — a `false` answer
//! means the key is definitely absent and the block scan can be skipped.

use bloomfilter::Bloom;
use thiserror::Error;

/// Target false-positive rate for newly constructed filters (~1%).
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Errors constructing or parsing a [`MembershipFilter`].
#[derive(Debug, Error)]
pub enum FilterError {
    /// The underlying bloom filter could not be sized or parsed.
    #[error("membership filter error: {0}")]
    Bloom(String),
}

/// A probabilistic set answering "definitely not present / maybe present".
pub struct MembershipFilter {
    bloom: Bloom<[u8]>,
}

impl MembershipFilter {
    /// Construct a filter sized for `expected_items` elements at the given
    /// false-positive rate. `expected_items` is clamped to at least 1 so an
    /// empty SST still produces a well-formed (if trivial) filter.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Result<Self, FilterError> {
        let bloom = Bloom::new_for_fp_rate(expected_items.max(1), false_positive_rate)
            .map_err(|e| FilterError::Bloom(e.to_string()))?;
        Ok(Self { bloom })
    }

    /// Record `key` as present.
    pub fn add(&mut self, key: &[u8]) {
        self.bloom.set(key);
    }

    /// `false` means `key` is definitely absent; `true` means it may be
    /// present (subject to the filter's false-positive rate).
    pub fn contains(&self, key: &[u8]) -> bool {
        self.bloom.check(key)
    }

    /// Serialize the filter to its on-disk byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bloom.as_slice().to_vec()
    }

    /// Deserialize a filter previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// An empty `bytes` slice yields a permissive filter that always answers
    /// `true` — callers fall back to reading the block rather than treating
    /// a missing filter as a hard "not found".
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FilterError> {
        if bytes.is_empty() {
            return Self::new(1, DEFAULT_FALSE_POSITIVE_RATE);
        }
        let bloom =
            Bloom::from_slice(bytes).map_err(|e| FilterError::Bloom(e.to_string()))?;
        Ok(Self { bloom })
    }
}
