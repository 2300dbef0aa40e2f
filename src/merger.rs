//! Binary heap merger.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;
use std::marker::PhantomData;

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs).
///
/// The heap holds at most one item per input: the next unread item of every non-exhausted chunk.
/// Equal items are emitted in chunk order, lowest chunk index first.
pub struct BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    items: BinaryHeap<Reverse<(T, usize)>>,
    chunks: Vec<C::IntoIter>,

    error_type: PhantomData<E>,
}

impl<T, E, C> BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order otherwise the result is undefined.
    /// Reads the first item of every chunk and fails on the first read error.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    pub fn new<I>(chunks: I) -> Result<Self, E>
    where
        I: IntoIterator<Item = C>,
    {
        let mut chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let mut items = BinaryHeap::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter_mut().enumerate() {
            if let Some(item) = chunk.next() {
                items.push(Reverse((item?, idx)));
            }
        }

        return Ok(BinaryHeapMerger {
            chunks,
            items,
            error_type: PhantomData,
        });
    }

    /// Returns `true` if any item is left.
    pub fn has_next(&self) -> bool {
        !self.items.is_empty()
    }

    /// Returns the number of merged chunks.
    pub fn chunks_number(&self) -> usize {
        self.chunks.len()
    }
}

impl<T, E, C> Iterator for BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    ///
    /// A read error is returned in place of the popped item and ends the merge: the popped item and
    /// the items left in the heap are discarded, so every later call returns [`None`].
    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((result, idx)) = self.items.pop()?;
        if let Some(item) = self.chunks[idx].next() {
            match item {
                Ok(item) => self.items.push(Reverse((item, idx))),
                Err(err) => {
                    self.items.clear();
                    return Some(Err(err));
                }
            }
        }

        return Some(Ok(result));
    }
}
