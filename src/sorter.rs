//! External line sorter.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;
use std::sync::atomic::{self, AtomicBool};
use std::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::chunker::LineChunker;
use crate::merger::KWayMerger;
use crate::run::SortedRun;

/// Default number of records collected into one chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Invalid configuration value.
    Config(String),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPool(rayon::ThreadPoolBuildError),
    /// Input source read error.
    InputRead(io::Error),
    /// Sorted run creation or write error.
    ChunkWrite(io::Error),
    /// Sorted run read error during merge.
    MergeRead(io::Error),
    /// Output destination write error.
    MergeWrite(io::Error),
    /// The operation was aborted through its cancellation token.
    Canceled,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Config(_) => None,
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPool(err) => Some(err),
            SortError::InputRead(err) => Some(err),
            SortError::ChunkWrite(err) => Some(err),
            SortError::MergeRead(err) => Some(err),
            SortError::MergeWrite(err) => Some(err),
            SortError::Canceled => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Config(reason) => write!(f, "invalid configuration: {}", reason),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPool(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::InputRead(err) => write!(f, "input read failed: {}", err),
            SortError::ChunkWrite(err) => write!(f, "sorted run write failed: {}", err),
            SortError::MergeRead(err) => write!(f, "sorted run read failed: {}", err),
            SortError::MergeWrite(err) => write!(f, "output write failed: {}", err),
            SortError::Canceled => write!(f, "sorting canceled"),
        }
    }
}

/// Line sorter builder. Provides methods for [`LineSorter`] initialization.
#[derive(Clone)]
pub struct LineSorterBuilder {
    /// Maximum number of records collected into one chunk.
    chunk_size: usize,
    /// Number of threads to be used to sort chunks in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Token aborting the sort when cancelled.
    cancellation: CancellationToken,
}

impl LineSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        LineSorterBuilder::default()
    }

    /// Builds a [`LineSorter`] instance using provided configuration.
    pub fn build(self) -> Result<LineSorter, SortError> {
        LineSorter::new(
            self.chunk_size,
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
            self.cancellation,
        )
    }

    /// Sets the maximum number of records collected into one chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> LineSorterBuilder {
        self.chunk_size = chunk_size;
        return self;
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> LineSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> LineSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets run file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> LineSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets the cancellation token aborting the sort when cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> LineSorterBuilder {
        self.cancellation = token;
        return self;
    }
}

impl Default for LineSorterBuilder {
    fn default() -> Self {
        LineSorterBuilder {
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            cancellation: CancellationToken::new(),
        }
    }
}

/// External line sorter.
///
/// The sorter splits its input into bounded chunks, sorts the chunks
/// concurrently on a bounded worker pool, persists each one as a sorted run
/// and merges the runs into a single sorted stream. Chunking and merging
/// are strictly sequential; only chunk sorting runs in parallel, and the
/// merge never starts before every chunk task has terminated.
#[derive(Debug)]
pub struct LineSorter {
    /// Maximum number of records collected into one chunk.
    chunk_size: usize,
    /// Chunk sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory holding the sorted runs.
    tmp_dir: tempfile::TempDir,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Token aborting the sort when cancelled.
    cancellation: CancellationToken,
}

impl LineSorter {
    /// Creates a new line sorter instance.
    ///
    /// # Arguments
    /// * `chunk_size` - Maximum number of records collected into one chunk.
    /// * `threads_number` - Number of threads to be used to sort chunks in parallel. If the parameter
    ///   is [`None`] threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If parameter is [`None`] default
    ///   OS temporary directory will be used.
    /// * `rw_buf_size` - Run file read/write buffer size.
    /// * `cancellation` - Token aborting the sort when cancelled.
    pub fn new(
        chunk_size: usize,
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
        cancellation: CancellationToken,
    ) -> Result<Self, SortError> {
        if chunk_size == 0 {
            return Err(SortError::Config("chunk size must be positive".to_string()));
        }
        if threads_number == Some(0) {
            return Err(SortError::Config("threads number must be positive".to_string()));
        }

        return Ok(LineSorter {
            chunk_size,
            rw_buf_size,
            cancellation,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing worker pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing worker pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPool(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Sorts lines from the input under the natural byte order.
    /// Returns an iterator that can be used to get the sorted line stream.
    ///
    /// # Arguments
    /// * `input` - Input stream lines to be fetched from
    pub fn sort<I>(
        &self,
        input: I,
    ) -> Result<KWayMerger<SortedRun, impl Fn(&str, &str) -> Ordering + Copy>, SortError>
    where
        I: IntoIterator<Item = io::Result<String>>,
        I::IntoIter: Send,
    {
        self.sort_by(input, |a: &str, b: &str| a.cmp(b))
    }

    /// Sorts lines from the input using a custom compare function.
    /// Returns an iterator that can be used to get the sorted line stream.
    ///
    /// The same comparator orders every chunk and the final merge, so the
    /// result is exactly what a single-pass sort under `compare` would
    /// produce. The method returns only after every chunk task has reached
    /// a terminal state; no record is merged before that point.
    ///
    /// # Arguments
    /// * `input` - Input stream lines to be fetched from
    /// * `compare` - Function to be used to compare lines
    pub fn sort_by<I, F>(&self, input: I, compare: F) -> Result<KWayMerger<SortedRun, F>, SortError>
    where
        I: IntoIterator<Item = io::Result<String>>,
        I::IntoIter: Send,
        F: Fn(&str, &str) -> Ordering + Sync + Send + Copy,
    {
        let runs = self.sort_chunks(input, compare)?;

        if self.cancellation.is_canceled() {
            return Err(SortError::Canceled);
        }

        log::debug!("merging {} sorted runs", runs.len());
        return Ok(KWayMerger::new(runs, compare));
    }

    /// Chunking and chunk sorting phases: dispatches one sort-and-store task
    /// per chunk to the worker pool and joins them all before returning.
    fn sort_chunks<I, F>(&self, input: I, compare: F) -> Result<Vec<SortedRun>, SortError>
    where
        I: IntoIterator<Item = io::Result<String>>,
        I::IntoIter: Send,
        F: Fn(&str, &str) -> Ordering + Sync + Send + Copy,
    {
        let input = input.into_iter();
        let failed = &AtomicBool::new(false);
        let (result_tx, result_rx) = mpsc::channel();

        // The scope join is the barrier between the chunk sorting and the
        // merge phases. Every task reports its run handle or error through
        // the channel; results are collected only after the join.
        let dispatched = self.thread_pool.scope(move |scope| {
            let mut dispatched = 0;

            for (index, chunk) in LineChunker::new(input, self.chunk_size).enumerate() {
                if self.cancellation.is_canceled() {
                    failed.store(true, atomic::Ordering::Relaxed);
                    return Err(SortError::Canceled);
                }

                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        failed.store(true, atomic::Ordering::Relaxed);
                        return Err(SortError::InputRead(err));
                    }
                };

                log::debug!("dispatching chunk {} ({} records)", index, chunk.len());
                let task_tx = result_tx.clone();
                dispatched += 1;

                scope.spawn(move |_| {
                    // skip the work once the pipeline is failing; the task
                    // still terminates normally so the join is not held up
                    if failed.load(atomic::Ordering::Relaxed) {
                        return;
                    }
                    if self.cancellation.is_canceled() {
                        failed.store(true, atomic::Ordering::Relaxed);
                        let _ = task_tx.send(Err(SortError::Canceled));
                        return;
                    }

                    let mut chunk = chunk;
                    chunk.sort_unstable_by(|a, b| compare(a, b));

                    let result = match SortedRun::create(&self.tmp_dir, &chunk, self.rw_buf_size) {
                        Ok(run) => {
                            log::debug!("chunk {} sorted and stored", index);
                            Ok((index, run))
                        }
                        Err(err) => {
                            failed.store(true, atomic::Ordering::Relaxed);
                            Err(SortError::ChunkWrite(err))
                        }
                    };
                    let _ = task_tx.send(result);
                });
            }

            Ok(dispatched)
        })?;

        let mut runs = Vec::from_iter((0..dispatched).map(|_| None));
        let mut first_error = None;

        for result in result_rx {
            match result {
                Ok((index, run)) => runs[index] = Some(run),
                Err(err) => first_error = first_error.or(Some(err)),
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let runs = Vec::from_iter(runs.into_iter().flatten());
        log::debug!("{} chunks sorted and stored", runs.len());
        return Ok(runs);
    }

    /// Sorts a newline-delimited file into `output` using a custom compare
    /// function.
    ///
    /// The result is staged in a temporary file next to `output` and
    /// promoted over it only on full success, so a failed sort never leaves
    /// a partial output file behind; `output` is overwritten atomically.
    ///
    /// # Arguments
    /// * `input` - Newline-delimited file to be sorted
    /// * `output` - Destination file, overwritten on success
    /// * `compare` - Function to be used to compare lines
    pub fn sort_file<F>(&self, input: &Path, output: &Path, compare: F) -> Result<(), SortError>
    where
        F: Fn(&str, &str) -> Ordering + Sync + Send + Copy,
    {
        log::info!("sorting {} into {}", input.display(), output.display());

        let input_file = fs::File::open(input).map_err(|err| SortError::InputRead(err))?;
        let reader = io::BufReader::new(input_file);

        let staging_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staging = tempfile::NamedTempFile::new_in(staging_dir).map_err(|err| SortError::MergeWrite(err))?;

        let merger = self.sort_by(reader.lines(), compare)?;

        let mut writer = io::BufWriter::new(staging.as_file().try_clone().map_err(|err| SortError::MergeWrite(err))?);
        let mut count: u64 = 0;

        for line in merger {
            if self.cancellation.is_canceled() {
                return Err(SortError::Canceled);
            }

            let line = line.map_err(|err| SortError::MergeRead(err))?;
            writer.write_all(line.as_bytes()).map_err(|err| SortError::MergeWrite(err))?;
            writer.write_all(b"\n").map_err(|err| SortError::MergeWrite(err))?;
            count += 1;
        }
        writer.flush().map_err(|err| SortError::MergeWrite(err))?;
        drop(writer);

        staging.persist(output).map_err(|err| SortError::MergeWrite(err.error))?;

        log::info!("sort finished: {} records", count);
        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;
    use std::fs;
    use std::io::{self, prelude::*};
    use std::path::Path;

    use rand::seq::SliceRandom;
    use rstest::*;

    use crate::cancel::CancellationToken;

    use super::{LineSorterBuilder, SortError};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn numeric(a: &str, b: &str) -> Ordering {
        let a: u64 = a.parse().unwrap();
        let b: u64 = b.parse().unwrap();
        a.cmp(&b)
    }

    fn write_lines<I, S>(path: &Path, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut writer = io::BufWriter::new(fs::File::create(path).unwrap());
        for line in lines {
            writeln!(writer, "{}", line.as_ref()).unwrap();
        }
        writer.flush().unwrap();
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_line_sorter(#[case] reversed: bool, tmp_dir: tempfile::TempDir) {
        let input_sorted = Vec::from_iter((0..100).map(|n| format!("{:03}", n)));

        let mut input_shuffled = input_sorted.clone();
        input_shuffled.shuffle(&mut rand::thread_rng());

        let input: Vec<io::Result<String>> = Vec::from_iter(input_shuffled.into_iter().map(|line| Ok(line)));

        let sorter = LineSorterBuilder::new()
            .with_chunk_size(8)
            .with_threads_number(2)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let compare = if reversed {
            |a: &str, b: &str| a.cmp(b).reverse()
        } else {
            |a: &str, b: &str| a.cmp(b)
        };

        let result = sorter.sort_by(input, compare).unwrap();

        let actual_result: io::Result<Vec<String>> = result.collect();
        let actual_result = actual_result.unwrap();
        let expected_result = if reversed {
            Vec::from_iter(input_sorted.iter().rev().cloned())
        } else {
            input_sorted.clone()
        };

        assert_eq!(actual_result, expected_result);
    }

    #[rstest]
    #[case(7)]
    #[case(8)]
    #[case(9)]
    #[case(16)]
    fn test_chunk_boundaries(#[case] count: usize, tmp_dir: tempfile::TempDir) {
        let expected = Vec::from_iter((0..count).map(|n| format!("{:02}", n)));

        let mut shuffled = expected.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        let input: Vec<io::Result<String>> = Vec::from_iter(shuffled.into_iter().map(|line| Ok(line)));

        let sorter = LineSorterBuilder::new()
            .with_chunk_size(8)
            .with_threads_number(2)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let actual: io::Result<Vec<String>> = sorter.sort(input).unwrap().collect();

        assert_eq!(actual.unwrap(), expected);
    }

    #[rstest]
    fn test_numeric_file_sort(tmp_dir: tempfile::TempDir) {
        // 25,000 decimal integers with the default chunk size produce three
        // runs (10,000 / 10,000 / 5,000) merged into one ascending file.
        let mut values = Vec::from_iter(0..25_000u32);
        values.shuffle(&mut rand::thread_rng());

        let input_path = tmp_dir.path().join("input.txt");
        let output_path = tmp_dir.path().join("output.txt");
        write_lines(&input_path, values.iter().map(|n| n.to_string()));

        let sorter = LineSorterBuilder::new().with_tmp_dir(tmp_dir.path()).build().unwrap();

        sorter.sort_file(&input_path, &output_path, numeric).unwrap();

        let output = fs::read_to_string(&output_path).unwrap();
        let lines = Vec::from_iter(output.lines().map(|line| line.parse::<u32>().unwrap()));

        assert_eq!(lines.len(), 25_000);
        assert!(lines.windows(2).all(|pair| pair[0] <= pair[1]));

        let mut multiset = lines.clone();
        multiset.sort_unstable();
        assert_eq!(multiset, Vec::from_iter(0..25_000));
    }

    #[rstest]
    fn test_empty_input(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        let output_path = tmp_dir.path().join("output.txt");
        write_lines(&input_path, Vec::<String>::new());

        let sorter = LineSorterBuilder::new().with_tmp_dir(tmp_dir.path()).build().unwrap();

        sorter.sort_file(&input_path, &output_path, |a, b| a.cmp(b)).unwrap();

        assert_eq!(fs::read_to_string(&output_path).unwrap(), "");
    }

    #[rstest]
    fn test_pool_size_independence(tmp_dir: tempfile::TempDir) {
        let mut values = Vec::from_iter((0..250u32).flat_map(|n| [n, n, n, n]));
        values.shuffle(&mut rand::thread_rng());

        let input_path = tmp_dir.path().join("input.txt");
        write_lines(&input_path, values.iter().map(|n| n.to_string()));

        let mut outputs = Vec::new();
        for threads in [1, 4, 64] {
            let output_path = tmp_dir.path().join(format!("output-{}.txt", threads));
            let sorter = LineSorterBuilder::new()
                .with_chunk_size(100)
                .with_threads_number(threads)
                .with_tmp_dir(tmp_dir.path())
                .build()
                .unwrap();

            sorter.sort_file(&input_path, &output_path, numeric).unwrap();
            outputs.push(fs::read(&output_path).unwrap());
        }

        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
    }

    #[rstest]
    fn test_missing_input(tmp_dir: tempfile::TempDir) {
        let output_path = tmp_dir.path().join("output.txt");

        let sorter = LineSorterBuilder::new().with_tmp_dir(tmp_dir.path()).build().unwrap();

        let err = sorter
            .sort_file(&tmp_dir.path().join("missing.txt"), &output_path, |a, b| a.cmp(b))
            .unwrap_err();

        assert!(matches!(err, SortError::InputRead(_)));
        assert!(!output_path.exists());
    }

    #[rstest]
    fn test_unwritable_output(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        write_lines(&input_path, ["b", "a"]);

        let output_path = tmp_dir.path().join("missing-dir").join("output.txt");

        let sorter = LineSorterBuilder::new().with_tmp_dir(tmp_dir.path()).build().unwrap();

        let err = sorter.sort_file(&input_path, &output_path, |a, b| a.cmp(b)).unwrap_err();

        assert!(matches!(err, SortError::MergeWrite(_)));
        assert!(!output_path.exists());
    }

    #[rstest]
    fn test_canceled(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        let output_path = tmp_dir.path().join("output.txt");
        write_lines(&input_path, (0..100).map(|n| n.to_string()));

        let token = CancellationToken::new();
        let sorter = LineSorterBuilder::new()
            .with_chunk_size(10)
            .with_tmp_dir(tmp_dir.path())
            .with_cancellation(token.clone())
            .build()
            .unwrap();

        token.cancel();
        let err = sorter.sort_file(&input_path, &output_path, |a, b| a.cmp(b)).unwrap_err();

        assert!(matches!(err, SortError::Canceled));
        assert!(!output_path.exists());
    }

    #[rstest]
    fn test_zero_chunk_size_rejected() {
        let err = LineSorterBuilder::new().with_chunk_size(0).build().unwrap_err();

        assert!(matches!(err, SortError::Config(_)));
    }

    #[rstest]
    fn test_zero_threads_rejected() {
        let err = LineSorterBuilder::new().with_threads_number(0).build().unwrap_err();

        assert!(matches!(err, SortError::Config(_)));
    }
}
