//! Random node heights.
//!
//! New nodes draw their height from a geometric distribution:
//! `P(height >= k) = 2^-(k-1)`, capped at the list's maximum height. The
//! source keeps a small buffer of pre-generated heights so a burst of
//! splits does not serialize on the generator.

use std::collections::VecDeque;

/// Probability of growing a height draw by one more level.
const P: f64 = 0.5;

/// How many heights to generate per refill.
const BUFFER: usize = 4;

/// A lazily-buffered stream of geometric node heights in `[1, max_height]`.
///
/// Lives entirely inside the list's exclusion region, so it needs no
/// synchronization of its own.
pub(crate) struct HeightSource {
    rng: fastrand::Rng,
    max_height: usize,
    buf: VecDeque<usize>,
}

impl HeightSource {
    pub(crate) fn new(max_height: usize) -> Self {
        HeightSource {
            rng: fastrand::Rng::new(),
            max_height,
            buf: VecDeque::with_capacity(BUFFER),
        }
    }

    /// Returns the next height, refilling the buffer when it runs dry.
    pub(crate) fn next_height(&mut self) -> usize {
        if self.buf.is_empty() {
            self.refill();
        }
        self.buf.pop_front().expect("height buffer refilled above")
    }

    fn refill(&mut self) {
        for _ in 0..BUFFER {
            let mut height = 1;
            while self.rng.f64() < P && height < self.max_height {
                height += 1;
            }
            self.buf.push_back(height);
        }
    }
}
