// Median smoothing over the last N frame estimates

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct MedianFilter {
    history: VecDeque<f32>,
    capacity: usize,
    scratch: Vec<f32>,
}

impl MedianFilter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            scratch: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Push a value, dropping the oldest once full, and return the current median
    ///
    /// For an even count the upper of the two middle values is returned.
    pub fn push(&mut self, value: f32) -> f32 {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(value);

        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        self.scratch.sort_by(|a, b| a.total_cmp(b));
        self.scratch[self.scratch.len() / 2]
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Change the window; history is discarded
    pub fn resize(&mut self, capacity: usize) {
        *self = Self::new(capacity);
    }

    /// Oldest-first copy of the history
    pub fn values(&self) -> Vec<f32> {
        self.history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_single_outlier() {
        let mut filter = MedianFilter::new(5);
        for value in [41.2, 41.3, 82.4, 41.1] {
            filter.push(value);
        }
        let median = filter.push(41.2);
        assert!((median - 41.2).abs() < 0.15);
    }

    #[test]
    fn test_upper_median_for_even_count() {
        let mut filter = MedianFilter::new(4);
        filter.push(1.0);
        assert_eq!(filter.push(3.0), 3.0);
    }

    #[test]
    fn test_oldest_dropped_when_full() {
        let mut filter = MedianFilter::new(3);
        for value in [100.0, 1.0, 2.0, 3.0] {
            filter.push(value);
        }
        assert_eq!(filter.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_resize_discards_history() {
        let mut filter = MedianFilter::new(5);
        filter.push(41.2);
        filter.push(41.2);
        filter.resize(9);
        assert!(filter.is_empty());
        assert_eq!(filter.capacity(), 9);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut filter = MedianFilter::new(0);
        filter.push(5.0);
        assert_eq!(filter.push(7.0), 7.0);
        assert_eq!(filter.len(), 1);
    }
}
