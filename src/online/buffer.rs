//! Bounded sample buffer shared between producers and the controller

use crate::data::Sample;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Thread-safe FIFO of the most recent samples
///
/// Once `capacity` is reached every insert evicts the oldest sample. Reads
/// return copies taken under the lock, never references into the queue.
#[derive(Debug)]
pub struct OnlineLearningBuffer {
    samples: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl OnlineLearningBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, returning the evicted one if the buffer was full
    pub fn add_sample(&self, sample: Sample) -> Option<Sample> {
        let mut samples = self.samples.lock();
        let evicted = if samples.len() >= self.capacity {
            samples.pop_front()
        } else {
            None
        };
        samples.push_back(sample);
        evicted
    }

    /// Copies of the `n` most recent samples, oldest first
    pub fn get_samples(&self, n: usize) -> Vec<Sample> {
        let samples = self.samples.lock();
        let start = samples.len().saturating_sub(n);
        samples.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_eviction() {
        let buffer = OnlineLearningBuffer::new(5);
        for i in 0..12 {
            buffer.add_sample(Sample::new(vec![i as f64], i as f64));
        }
        assert_eq!(buffer.len(), 5);

        let targets: Vec<f64> = buffer.get_samples(5).iter().map(|s| s.target).collect();
        assert_eq!(targets, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_get_samples_bounds() {
        let buffer = OnlineLearningBuffer::new(10);
        assert!(buffer.get_samples(3).is_empty());

        for i in 0..4 {
            buffer.add_sample(Sample::new(vec![0.0], i as f64));
        }
        let targets: Vec<f64> = buffer.get_samples(2).iter().map(|s| s.target).collect();
        assert_eq!(targets, vec![2.0, 3.0]);
        assert_eq!(buffer.get_samples(100).len(), 4);
    }

    #[test]
    fn test_eviction_returns_oldest() {
        let buffer = OnlineLearningBuffer::new(2);
        assert!(buffer.add_sample(Sample::new(vec![], 1.0)).is_none());
        assert!(buffer.add_sample(Sample::new(vec![], 2.0)).is_none());
        let evicted = buffer.add_sample(Sample::new(vec![], 3.0)).unwrap();
        assert_eq!(evicted.target, 1.0);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let buffer = Arc::new(OnlineLearningBuffer::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..100 {
                        buffer.add_sample(Sample::new(vec![t as f64], i as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(buffer.len(), 400);
    }
}
