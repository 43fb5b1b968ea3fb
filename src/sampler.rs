//! A fixed-capacity reservoir sampler (Algorithm R) over a stream of
//! unknown length, shared across scanner worker threads behind a single
//! mutex. Keeps an exact count of everything it has seen alongside the
//! uniformly-sampled subset.

use std::sync::Mutex;

use rand::Rng;

struct Reservoir<T> {
    capacity: usize,
    seen: u64,
    items: Vec<T>,
}

impl<T> Reservoir<T> {
    fn new(capacity: usize) -> Self {
        Reservoir { capacity, seen: 0, items: Vec::with_capacity(capacity) }
    }

    fn offer(&mut self, item: T, rng: &mut impl Rng) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        // Algorithm R: the nth item (1-indexed) replaces a uniformly
        // random existing slot with probability capacity/n.
        let j = rng.gen_range(0..self.seen);
        if (j as usize) < self.capacity {
            self.items[j as usize] = item;
        }
    }
}

/// Thread-safe fixed-capacity uniform sampler. `offer` may be called
/// concurrently from any number of worker threads; all of them contend on
/// one internal mutex, matching the reference scanner's single shared
/// sampler instance.
pub struct ReservoirSampler<T> {
    inner: Mutex<Reservoir<T>>,
}

impl<T> ReservoirSampler<T> {
    pub fn new(capacity: usize) -> Self {
        ReservoirSampler { inner: Mutex::new(Reservoir::new(capacity)) }
    }

    /// Offers one observed item to the sampler.
    pub fn offer(&self, item: T) {
        let mut rng = rand::thread_rng();
        self.inner.lock().unwrap().offer(item, &mut rng);
    }

    /// Total number of items ever offered, independent of how many are
    /// retained in the sample.
    pub fn count(&self) -> u64 {
        self.inner.lock().unwrap().seen
    }

    /// Consumes the sampler and returns its retained sample. Order is not
    /// guaranteed.
    pub fn into_samples(self) -> Vec<T> {
        self.inner.into_inner().unwrap().items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keeps_everything_under_capacity() {
        let sampler = ReservoirSampler::new(10);
        for i in 0..5 {
            sampler.offer(i);
        }
        assert_eq!(sampler.count(), 5);
        let samples = sampler.into_samples();
        assert_eq!(samples.len(), 5);
        let set: HashSet<_> = samples.into_iter().collect();
        assert_eq!(set, (0..5).collect());
    }

    #[test]
    fn caps_at_capacity_but_counts_exactly() {
        let sampler = ReservoirSampler::new(10);
        for i in 0..1000 {
            sampler.offer(i);
        }
        assert_eq!(sampler.count(), 1000);
        let samples = sampler.into_samples();
        assert_eq!(samples.len(), 10);
        for s in &samples {
            assert!(*s < 1000);
        }
    }

    #[test]
    fn concurrent_offers_preserve_exact_count() {
        let sampler = ReservoirSampler::new(50);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let sampler = &sampler;
                scope.spawn(move || {
                    for i in 0..500 {
                        sampler.offer(t * 500 + i);
                    }
                });
            }
        });
        assert_eq!(sampler.count(), 4000);
        assert_eq!(sampler.into_samples().len(), 50);
    }
}
