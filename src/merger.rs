//! Heap based k-way merge.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;

/// Heap entry holding the head record of one partially consumed source.
struct Cursor<F> {
    head: String,
    source: usize,
    compare: F,
}

impl<F> PartialEq for Cursor<F>
where
    F: Fn(&str, &str) -> Ordering + Copy,
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<F> Eq for Cursor<F> where F: Fn(&str, &str) -> Ordering + Copy {}

impl<F> PartialOrd for Cursor<F>
where
    F: Fn(&str, &str) -> Ordering + Copy,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<F> Ord for Cursor<F>
where
    F: Fn(&str, &str) -> Ordering + Copy,
{
    fn cmp(&self, other: &Self) -> Ordering {
        // The standard binary heap is a max-heap, so the comparator is
        // reversed to pop the smallest head first. Ties go to the lower
        // source index to keep the merge order deterministic.
        (self.compare)(&self.head, &other.head)
            .reverse()
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// K-way merger over pre-sorted sources.
///
/// Merges multiple sorted inputs into a single sorted output using a binary
/// heap keyed by the supplied comparator. Time complexity is *n* \* log(*k*)
/// in the worst case where *n* is the total record count and *k* is the
/// number of sources. Every source must be sorted ascending under the same
/// comparator, otherwise the result is undefined.
pub struct KWayMerger<C, F>
where
    C: IntoIterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering + Copy,
{
    cursors: BinaryHeap<Cursor<F>>,
    sources: Vec<Option<C::IntoIter>>,
    compare: F,
    initiated: bool,
}

impl<C, F> KWayMerger<C, F>
where
    C: IntoIterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering + Copy,
{
    /// Creates a merger over `sources` ordered by `compare`.
    pub fn new<S>(sources: S, compare: F) -> Self
    where
        S: IntoIterator<Item = C>,
    {
        let sources = Vec::from_iter(sources.into_iter().map(|source| Some(source.into_iter())));
        let cursors = BinaryHeap::with_capacity(sources.len());

        return KWayMerger {
            cursors,
            sources,
            compare,
            initiated: false,
        };
    }

    /// Pulls the next record from a source into the heap, releasing the
    /// source as soon as it is exhausted.
    fn advance(&mut self, index: usize) -> io::Result<()> {
        let next = match self.sources[index].as_mut() {
            Some(source) => source.next(),
            None => None,
        };

        match next {
            Some(Ok(head)) => {
                self.cursors.push(Cursor {
                    head,
                    source: index,
                    compare: self.compare,
                });
            }
            Some(Err(err)) => return Err(err),
            None => self.sources[index] = None,
        }

        return Ok(());
    }
}

impl<C, F> Iterator for KWayMerger<C, F>
where
    C: IntoIterator<Item = io::Result<String>>,
    F: Fn(&str, &str) -> Ordering + Copy,
{
    type Item = io::Result<String>;

    /// Returns the next record from the sources in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            for index in 0..self.sources.len() {
                if let Err(err) = self.advance(index) {
                    return Some(Err(err));
                }
            }
            self.initiated = true;
        }

        let cursor = self.cursors.pop()?;
        if let Err(err) = self.advance(cursor.source) {
            return Some(Err(err));
        }

        return Some(Ok(cursor.head));
    }
}
