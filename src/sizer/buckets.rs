//! Logarithmic bucketing of amounts.

use ethers::types::U256;

use crate::error::SizerError;
use crate::math;

/// `count` buckets evenly spaced in log10 between `min` and `max`.
/// Bucket `i` is represented by its lower edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogBuckets {
    count: usize,
    log_min: f64,
    log_max: f64,
}

impl LogBuckets {
    pub fn new(min: U256, max: U256, count: usize) -> Result<Self, SizerError> {
        if count == 0 {
            return Err(SizerError::InvalidBuckets("bucket count is zero"));
        }
        if min.is_zero() || min >= max {
            return Err(SizerError::InvalidBuckets("range must be non-empty and above zero"));
        }
        Ok(Self {
            count,
            log_min: math::to_f64(min).log10(),
            log_max: math::to_f64(max).log10(),
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    fn step(&self) -> f64 {
        (self.log_max - self.log_min) / self.count as f64
    }

    /// Bucket holding `value`, clamped to the first and last bucket.
    #[inline]
    pub fn index(&self, value: &U256) -> usize {
        let v = math::to_f64(*value);
        if v <= 0.0 {
            return 0;
        }
        let pos = (v.log10() - self.log_min) / self.step();
        if pos <= 0.0 {
            0
        } else {
            (pos as usize).min(self.count - 1)
        }
    }

    pub fn representative(&self, index: usize) -> U256 {
        let idx = index.min(self.count - 1) as f64;
        math::from_f64(10f64.powf(self.log_min + idx * self.step()))
    }
}
