//! `line-sort` is a parallel external merge sort for newline-delimited text files.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must
//! be resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During
//! the first pass the input is split into bounded chunks which are sorted concurrently and persisted as sorted
//! runs, during the second pass the runs are merged together with a heap based k-way merge. For more information
//! see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `line-sort` supports the following features:
//!
//! * **Line oriented:**
//!   a record is one line of text; the input, the intermediate runs and the output are all newline-delimited
//!   files, so no serialization layer is involved.
//! * **Caller-defined order:**
//!   any total order over lines can be supplied as a plain comparison function; the same function orders every
//!   chunk and the final merge, so chunking is semantically transparent.
//! * **Bounded parallelism:**
//!   chunks are sorted on a worker pool sized to the available processing units (or an explicit thread count),
//!   never one unconstrained task per chunk.
//! * **Fail fast:**
//!   any read or write failure aborts the whole sort with a descriptive error; intermediate storage is
//!   reclaimed and no partial output file is left behind.
//! * **Cancelable:**
//!   a [`CancellationToken`] aborts a running sort at chunk and record granularity.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use line_sort::LineSorterBuilder;
//!
//! fn main() {
//!     let sorter = LineSorterBuilder::new()
//!         .with_chunk_size(10_000)
//!         .with_tmp_dir(Path::new("./tmp"))
//!         .build()
//!         .unwrap();
//!
//!     sorter
//!         .sort_file(Path::new("input.txt"), Path::new("output.txt"), |a, b| a.cmp(b))
//!         .unwrap();
//! }
//! ```

pub mod cancel;
pub mod chunker;
pub mod merger;
pub mod run;
pub mod sorter;

pub use cancel::CancellationToken;
pub use chunker::LineChunker;
pub use merger::KWayMerger;
pub use run::SortedRun;
pub use sorter::{LineSorter, LineSorterBuilder, SortError, DEFAULT_CHUNK_SIZE};
