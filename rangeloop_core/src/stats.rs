//! Fixed-capacity rolling window with mean and population standard deviation.

use std::collections::VecDeque;

use crate::error::LoopError;

#[derive(Debug, Clone)]
pub struct RollingStatistics {
    buf: VecDeque<f64>,
    cap: usize,
}

impl RollingStatistics {
    /// Capacity must be at least 1.
    pub fn new(capacity: usize) -> Result<Self, LoopError> {
        if capacity == 0 {
            return Err(LoopError::Config("window capacity must be >= 1".into()));
        }
        Ok(Self {
            buf: VecDeque::with_capacity(capacity),
            cap: capacity,
        })
    }

    /// Append a sample, evicting the oldest one at capacity.
    pub fn add(&mut self, x: f64) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(x);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        let sum: f64 = self.buf.iter().sum();
        Some(sum / self.buf.len() as f64)
    }

    /// Population (divide-by-N) standard deviation, two-pass.
    pub fn population_std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self
            .buf
            .iter()
            .map(|x| {
                let d = x - mean;
                d * d
            })
            .sum::<f64>()
            / self.buf.len() as f64;
        Some(var.sqrt())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Held samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.buf.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_rejected() {
        assert!(RollingStatistics::new(0).is_err());
    }

    #[test]
    fn empty_window_has_no_moments() {
        let w = RollingStatistics::new(3).unwrap();
        assert_eq!(w.mean(), None);
        assert_eq!(w.population_std_dev(), None);
    }

    #[test]
    fn evicts_oldest() {
        let mut w = RollingStatistics::new(3).unwrap();
        for x in [1.0, 2.0, 3.0, 4.0] {
            w.add(x);
        }
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(w.mean(), Some(3.0));
    }

    #[test]
    fn population_not_sample_deviation() {
        let mut w = RollingStatistics::new(8).unwrap();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            w.add(x);
        }
        assert_eq!(w.population_std_dev(), Some(2.0));
    }
}
