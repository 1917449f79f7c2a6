//! Fixed-capacity ring of recent history samples
//!
//! The backing array is written in place: `write_index` is the slot the next
//! append lands in and `count` saturates at `N`. The physical array is not in
//! order once it wraps, so readers go through [`HistoryRing::iter`], which maps
//! logical positions (0 = oldest) onto slots and never touches a slot that has
//! not been written yet.
//!
//! ```text
//! N = 5, after 7 appends (s0..s6):
//!
//!   slot:   0    1    2    3    4
//!         [s5] [s6] [s2] [s3] [s4]
//!                     ^ write_index = 2, count = 5
//!
//!   logical order: s2 s3 s4 s5 s6
//! ```

use core::iter::FusedIterator;

use crate::config::HISTORY_CAPACITY;
use crate::reading::HistorySample;

/// History ring sized for the gateway
pub type History = HistoryRing<HISTORY_CAPACITY>;

#[derive(Debug, Clone)]
pub struct HistoryRing<const N: usize> {
    slots: [HistorySample; N],
    /// Slot the next append writes to, always `< N`
    write_index: usize,
    /// Number of written slots, saturates at `N`
    count: usize,
}

impl<const N: usize> HistoryRing<N> {
    pub const fn new() -> Self {
        const { assert!(N > 0, "history ring needs at least one slot") };
        Self {
            slots: [HistorySample::EMPTY; N],
            write_index: 0,
            count: 0,
        }
    }

    /// Store `sample`, overwriting the oldest one once full
    pub fn append(&mut self, sample: HistorySample) {
        self.slots[self.write_index] = sample;
        self.write_index = (self.write_index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Most recently appended sample
    pub fn latest(&self) -> Option<&HistorySample> {
        if self.is_empty() {
            return None;
        }
        Some(&self.slots[(self.write_index + N - 1) % N])
    }

    /// Sample at logical position `index`, 0 being the oldest
    pub fn get(&self, index: usize) -> Option<&HistorySample> {
        (index < self.count).then(|| &self.slots[self.physical_index(index)])
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> Iter<'_, N> {
        Iter {
            ring: self,
            front: 0,
            back: self.count,
        }
    }

    /// Alias of [`iter`](Self::iter) under the name reporting code uses
    pub fn logical_sequence(&self) -> Iter<'_, N> {
        self.iter()
    }

    fn physical_index(&self, logical: usize) -> usize {
        (self.write_index + N - self.count + logical) % N
    }
}

impl<const N: usize> Default for HistoryRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> IntoIterator for &'a HistoryRing<N> {
    type Item = &'a HistorySample;
    type IntoIter = Iter<'a, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Oldest-to-newest iterator over a [`HistoryRing`]
#[derive(Debug, Clone)]
pub struct Iter<'a, const N: usize> {
    ring: &'a HistoryRing<N>,
    front: usize,
    back: usize,
}

impl<'a, const N: usize> Iterator for Iter<'a, N> {
    type Item = &'a HistorySample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let sample = &self.ring.slots[self.ring.physical_index(self.front)];
        self.front += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<const N: usize> DoubleEndedIterator for Iter<'_, N> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(&self.ring.slots[self.ring.physical_index(self.back)])
    }
}

impl<const N: usize> ExactSizeIterator for Iter<'_, N> {}
impl<const N: usize> FusedIterator for Iter<'_, N> {}
