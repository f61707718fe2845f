use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Injected randomness so selection is replayable in tests.
pub trait IndexSource: Send {
    fn pick(&mut self, bound: usize) -> usize;
    /// Uniform in [0, 1); used for optional flourishes like bridges.
    fn chance(&mut self) -> f32;
}

pub struct SeededPicker {
    rng: StdRng,
}

impl SeededPicker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IndexSource for SeededPicker {
    fn pick(&mut self, bound: usize) -> usize {
        if bound <= 1 {
            return 0;
        }
        self.rng.random_range(0..bound)
    }

    fn chance(&mut self) -> f32 {
        self.rng.random_range(0.0..1.0)
    }
}

const MAX_RANDOM_ATTEMPTS: usize = 8;

/// Recently-used tracking for one response pool.
///
/// Picks a random index outside the recent set (bounded retries, then a
/// deterministic scan for an unused one). Once the set covers all but one
/// member it is cleared, so every member is eventually revisited — but the
/// immediately-prior pick is never repeated while the pool has more than
/// one member.
#[derive(Debug, Default)]
pub struct AntiRepeatPool {
    recent: HashSet<usize>,
    last: Option<usize>,
}

impl AntiRepeatPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, len: usize, rng: &mut dyn IndexSource) -> usize {
        if len == 0 {
            return 0;
        }
        if len == 1 {
            self.last = Some(0);
            return 0;
        }

        if self.recent.len() >= len - 1 {
            self.recent.clear();
        }

        let blocked = |i: usize, recent: &HashSet<usize>, last: Option<usize>| {
            recent.contains(&i) || last == Some(i)
        };

        let mut choice = None;
        for _ in 0..MAX_RANDOM_ATTEMPTS {
            let i = rng.pick(len);
            if !blocked(i, &self.recent, self.last) {
                choice = Some(i);
                break;
            }
        }
        let index = choice.unwrap_or_else(|| {
            (0..len)
                .find(|&i| !blocked(i, &self.recent, self.last))
                .unwrap_or(0)
        });

        self.recent.insert(index);
        self.last = Some(index);
        index
    }

    pub fn recently_used(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_repeats_previous_pick() {
        let mut pool = AntiRepeatPool::new();
        let mut rng = SeededPicker::new(7);
        let mut last = None;
        for _ in 0..100 {
            let pick = pool.select(4, &mut rng);
            assert_ne!(Some(pick), last);
            last = Some(pick);
        }
    }

    #[test]
    fn covers_whole_pool_over_time() {
        let mut pool = AntiRepeatPool::new();
        let mut rng = SeededPicker::new(3);
        let mut seen = HashSet::new();
        for _ in 0..40 {
            seen.insert(pool.select(5, &mut rng));
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn singleton_pool_always_picks_zero() {
        let mut pool = AntiRepeatPool::new();
        let mut rng = SeededPicker::new(1);
        assert_eq!(pool.select(1, &mut rng), 0);
        assert_eq!(pool.select(1, &mut rng), 0);
    }
}
