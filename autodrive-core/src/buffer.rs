//! Fixed-Size Circular Buffer
//!
//! ## Overview
//!
//! A ring buffer with its capacity fixed at compile time through const
//! generics. Pushing into a full buffer overwrites the oldest entry, which is
//! exactly the sliding-window behavior the latency tracker needs: the most
//! recent N samples, nothing older, no allocation.
//!
//! ### Why not `heapless::Deque`?
//!
//! `heapless::Deque::push_back` fails when full and leaves eviction to the
//! caller. Every window in this crate wants automatic overwrite, so the
//! policy lives here once.
//!
//! ### Memory Layout
//!
//! ```text
//! CircularBuffer<f32, 5>:
//! ┌─────┬─────┬─────┬─────┬─────┐
//! │  0  │  1  │  2  │  3  │  4  │  ← Array indices
//! └─────┴─────┴─────┴─────┴─────┘
//!    ↑
//!    └── write_pos: next slot to overwrite
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use autodrive_core::buffer::CircularBuffer;
//!
//! let mut window: CircularBuffer<f32, 3> = CircularBuffer::new();
//! for sample in [0.01, 0.02, 0.03, 0.04] {
//!     window.push(sample);
//! }
//!
//! let kept: Vec<f32> = window.iter().copied().collect();
//! assert_eq!(kept, vec![0.02, 0.03, 0.04]);
//! assert_eq!(window.total_pushed(), 4);
//! ```

/// Fixed-size circular buffer
///
/// ## Internal Invariants
///
/// - `write_pos < N`
/// - `len <= N`
/// - Iteration yields items oldest first
///
/// Not thread-safe; wrap it in a mutex if shared.
#[derive(Clone, Debug)]
pub struct CircularBuffer<T: Copy, const N: usize> {
    /// Storage; `None` marks slots never written
    data: [Option<T>; N],

    /// Index where the next write will occur
    write_pos: usize,

    /// Current number of valid items
    len: usize,

    /// Items pushed over the buffer's lifetime, including overwritten ones
    total_pushed: u64,
}

impl<T: Copy, const N: usize> CircularBuffer<T, N> {
    /// Creates a new empty circular buffer
    pub const fn new() -> Self {
        Self {
            data: [None; N],
            write_pos: 0,
            len: 0,
            total_pushed: 0,
        }
    }

    /// Adds an item, overwriting the oldest one when full
    pub fn push(&mut self, item: T) {
        if N == 0 {
            return;
        }

        self.data[self.write_pos] = Some(item);
        self.write_pos = (self.write_pos + 1) % N;
        self.total_pushed = self.total_pushed.saturating_add(1);

        if self.len < N {
            self.len += 1;
        }
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Compile-time capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Items pushed since creation or the last [`clear`](Self::clear)
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Most recent item
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }

        let idx = if self.write_pos == 0 { N - 1 } else { self.write_pos - 1 };
        self.data[idx].as_ref()
    }

    /// Iterate over items from oldest to newest
    pub fn iter(&self) -> CircularBufferIter<'_, T, N> {
        CircularBufferIter {
            buffer: self,
            index: 0,
        }
    }

    /// Remove all items
    pub fn clear(&mut self) {
        self.data = [None; N];
        self.write_pos = 0;
        self.len = 0;
        self.total_pushed = 0;
    }

    /// Item at logical index (0 = oldest, len-1 = newest)
    ///
    /// ```text
    /// Physical array:  [D, E, A, B, C]  (write_pos = 2)
    /// Logical view:    [A, B, C, D, E]
    /// logical[i] = physical[(write_pos + i) % N] once full
    /// ```
    fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }

        let actual_index = if self.len < N {
            index
        } else {
            (self.write_pos + index) % N
        };

        self.data[actual_index].as_ref()
    }
}

/// Iterator over circular buffer contents, oldest first
pub struct CircularBufferIter<'a, T: Copy, const N: usize> {
    buffer: &'a CircularBuffer<T, N>,
    index: usize,
}

impl<'a, T: Copy, const N: usize> Iterator for CircularBufferIter<'a, T, N> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.buffer.get(self.index)?;
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<T: Copy, const N: usize> Default for CircularBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer() {
        let buffer: CircularBuffer<f32, 5> = CircularBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert!(buffer.last().is_none());
        assert_eq!(buffer.iter().count(), 0);
    }

    #[test]
    fn circular_overwrite() {
        let mut buffer = CircularBuffer::<u32, 3>::new();

        for i in 0..5 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_full());
        assert_eq!(buffer.total_pushed(), 5);
        assert_eq!(buffer.last(), Some(&4));

        let values: Vec<u32> = buffer.iter().copied().collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn iterator_order_before_wrap() {
        let mut buffer = CircularBuffer::<u32, 4>::new();
        buffer.push(7);
        buffer.push(8);

        let values: Vec<u32> = buffer.iter().copied().collect();
        assert_eq!(values, vec![7, 8]);
        assert_eq!(buffer.iter().size_hint(), (2, Some(2)));
    }

    #[test]
    fn clear_resets_everything() {
        let mut buffer = CircularBuffer::<u32, 2>::new();
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.total_pushed(), 0);

        buffer.push(9);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![9]);
    }
}
