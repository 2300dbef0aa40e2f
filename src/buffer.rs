//! Memory limited buffer.

use std::mem;

use deepsize;

/// Buffer limited by consumed memory.
///
/// Consumed memory is estimated as the heap bytes owned by the pushed items plus the allocated capacity
/// of the buffer itself, so a growing buffer is accounted for as soon as it reallocates.
pub struct MemoryLimitedBuffer<T> {
    limit: u64,
    read_bytes: u64,
    inner: Vec<T>,
}

impl<T> MemoryLimitedBuffer<T>
where
    T: deepsize::DeepSizeOf + Ord,
{
    pub fn new(limit: u64) -> Self {
        MemoryLimitedBuffer {
            limit,
            read_bytes: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        self.read_bytes += (item.deep_size_of() - mem::size_of::<T>()) as u64;
        self.inner.push(item);
    }

    /// Returns buffer length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns estimated memory consumption in bytes.
    pub fn mem_size(&self) -> u64 {
        self.read_bytes + (self.inner.capacity() * mem::size_of::<T>()) as u64
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.mem_size() >= self.limit
    }

    /// Sorts buffered items in ascending order.
    pub fn sort(&mut self) {
        self.inner.sort_unstable();
    }
}

impl<T> IntoIterator for MemoryLimitedBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
