//! Sorted run storage.

use std::fs;
use std::io;
use std::io::prelude::*;

use tempfile;

/// A sorted chunk persisted to disk, ready to be merged.
///
/// The backing file is an anonymous temporary file inside the sorter's
/// temporary directory: it is unlinked at creation, so its space is
/// reclaimed as soon as the run is dropped, on success and failure paths
/// alike. A run is written exactly once by the chunk-sort task that creates
/// it and afterwards only read, line by line, through its [`Iterator`]
/// implementation.
pub struct SortedRun {
    reader: io::Take<io::BufReader<fs::File>>,
}

impl SortedRun {
    /// Writes `lines`, which the caller has already sorted, to a new run
    /// inside `dir` and returns a handle positioned at the first record.
    pub fn create<L, S>(dir: &tempfile::TempDir, lines: L, buf_size: Option<usize>) -> io::Result<Self>
    where
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tmp_file = tempfile::tempfile_in(dir)?;

        let mut writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        for line in lines {
            writer.write_all(line.as_ref().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let mut reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufReader::new(tmp_file.try_clone()?),
        };

        reader.rewind()?;
        let file_len = tmp_file.metadata()?.len();

        return Ok(SortedRun {
            reader: reader.take(file_len),
        });
    }
}

impl Iterator for SortedRun {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.limit() == 0 {
            return None;
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
