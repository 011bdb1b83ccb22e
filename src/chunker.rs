//! Bounded line chunking.

use std::io;

/// Splits a stream of lines into chunks of at most `chunk_size` records,
/// preserving input order.
///
/// Chunks are produced lazily, so no more than one chunk is ever held in
/// memory by the chunker itself. A read error from the underlying stream is
/// yielded immediately in place of a chunk; the pipeline treats it as fatal
/// and the chunker is not polled afterwards.
pub struct LineChunker<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    lines: I,
    chunk_size: usize,
}

impl<I> LineChunker<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    /// Creates a chunker producing chunks of at most `chunk_size` lines.
    pub fn new(lines: I, chunk_size: usize) -> Self {
        LineChunker { lines, chunk_size }
    }
}

impl<I> Iterator for LineChunker<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = io::Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = Vec::with_capacity(self.chunk_size);

        for line in self.lines.by_ref() {
            match line {
                Ok(line) => chunk.push(line),
                Err(err) => return Some(Err(err)),
            }

            if chunk.len() >= self.chunk_size {
                return Some(Ok(chunk));
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}
