//! Mask-driven brute force.
//!
//! Walks the Cartesian product of the mask's per-position character sets in
//! declaration order. A mask made of a single placeholder (`?a`, `?l`, ...)
//! may instead be given a length range, in which case every length from
//! `min_length` to `max_length` is enumerated in turn.
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;

use super::{AttackError, Candidates, StrategyInfo};
use crate::mask::{self, DEFAULT_HASH_RATE, Mask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BruteForce {
    mask: Arc<Mask>,
    min_length: usize,
    max_length: usize,
}

impl BruteForce {
    pub fn new(
        pattern: &str,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Result<Self, AttackError> {
        Self::from_mask(mask::parse(pattern)?, min_length, max_length)
    }

    pub fn from_mask(
        mask: Arc<Mask>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Result<Self, AttackError> {
        let default = mask.placeholder_count();
        let min_length = min_length.unwrap_or(default);
        let max_length = max_length.unwrap_or(default);
        if min_length > max_length {
            return Err(AttackError::Configuration(format!(
                "min length {min_length} exceeds max length {max_length}"
            )));
        }
        if mask.len() == 1 && mask.placeholder_count() == 1 && min_length == 0 {
            return Err(AttackError::Configuration(
                "length range must start at 1 or more".to_string(),
            ));
        }
        Ok(Self {
            mask,
            min_length,
            max_length,
        })
    }

    pub fn mask(&self) -> &Arc<Mask> {
        &self.mask
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Single-placeholder masks honor the length range.
    fn is_incremental(&self) -> bool {
        self.mask.len() == 1 && self.mask.placeholder_count() == 1
    }

    /// Exact size of the candidate space.
    pub fn total_combinations(&self) -> BigUint {
        if !self.is_incremental() {
            return self.mask.combinations();
        }
        let base = BigUint::from(self.mask.components()[0].size());
        (self.min_length..=self.max_length).fold(BigUint::zero(), |acc, len| {
            acc + base.pow(len as u32)
        })
    }

    /// Hours to exhaust the space at the default advisory rate.
    pub fn estimated_hours(&self) -> f64 {
        use num_traits::ToPrimitive;
        self.total_combinations().to_f64().unwrap_or(f64::INFINITY) / DEFAULT_HASH_RATE / 3600.0
    }

    /// The raw candidate iterator, without the `Result` wrapping.
    pub fn iter(&self) -> Box<dyn Iterator<Item = String> + Send + 'static> {
        if !self.is_incremental() {
            return Box::new(self.mask.iter());
        }
        Box::new(mask::expand_range(
            self.mask.charsets(),
            self.min_length,
            self.max_length,
        ))
    }

    pub fn candidates(&self) -> Candidates {
        Box::new(self.iter().map(Ok))
    }

    pub(crate) fn describe(&self, info: &mut StrategyInfo) {
        info.push("mask", self.mask.source());
        info.push("min_length", self.min_length);
        info.push("max_length", self.max_length);
        info.push("total_combinations", self.total_combinations());
        info.push("estimated_hours", format!("{:.4}", self.estimated_hours()));
    }
}
