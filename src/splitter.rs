//! Streaming input partitioner
//!
//! Cuts the input file into size-bounded, line-aligned run files without
//! ever holding more than one read buffer in memory. Runs are emitted
//! lazily, one per `next()`, so downstream sorting can start while the
//! tail of the input is still being split.
//!
//! The splitter is byte-transparent: concatenating the emitted runs in
//! order reproduces the input exactly, CR bytes and all. A run ends at
//! the first line boundary at or past the size target, so a run exceeds
//! the target by at most one line.

use crate::error::{IoContext, SortResult};
use crate::temp_store::TempStore;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Input partitioner configured with a size target and buffer sizes
pub struct Splitter {
    chunk_bytes: usize,
    read_buf_bytes: usize,
    write_buf_bytes: usize,
}

impl Splitter {
    pub fn new(chunk_bytes: usize, read_buf_bytes: usize, write_buf_bytes: usize) -> Self {
        Self {
            chunk_bytes,
            read_buf_bytes,
            write_buf_bytes,
        }
    }

    /// Open `input` and return the lazy sequence of run paths.
    pub fn split(&self, input: &Path, store: Arc<TempStore>) -> SortResult<SplitRuns> {
        let file = File::open(input).input_context(input)?;
        Ok(SplitRuns {
            reader: BufReader::with_capacity(self.read_buf_bytes, file),
            input: input.to_path_buf(),
            store,
            chunk_bytes: self.chunk_bytes,
            write_buf_bytes: self.write_buf_bytes,
            done: false,
        })
    }
}

/// Lazy, finite, non-restartable sequence of run-file paths
pub struct SplitRuns {
    reader: BufReader<File>,
    input: PathBuf,
    store: Arc<TempStore>,
    chunk_bytes: usize,
    write_buf_bytes: usize,
    done: bool,
}

impl Iterator for SplitRuns {
    type Item = SortResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_run() {
            Ok(Some(path)) => Some(Ok(path)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl SplitRuns {
    fn next_run(&mut self) -> SortResult<Option<PathBuf>> {
        if self.reader.fill_buf().input_context(&self.input)?.is_empty() {
            return Ok(None);
        }

        let path = self.store.new_unsorted_path();
        let file = File::create(&path).temp_context(&path)?;
        let mut writer = BufWriter::with_capacity(self.write_buf_bytes, file);
        let mut written = 0usize;

        loop {
            let buf = self.reader.fill_buf().input_context(&self.input)?;
            if buf.is_empty() {
                // EOF; the final run may end without a terminator
                break;
            }

            if written < self.chunk_bytes {
                let take = buf.len().min(self.chunk_bytes - written);
                writer.write_all(&buf[..take]).temp_context(&path)?;
                let ended_on_lf = buf[take - 1] == b'\n';
                self.reader.consume(take);
                written += take;
                if written >= self.chunk_bytes && ended_on_lf {
                    break;
                }
            } else {
                // Size target reached mid-line: keep writing to the next LF
                match memchr::memchr(b'\n', buf) {
                    Some(i) => {
                        writer.write_all(&buf[..=i]).temp_context(&path)?;
                        self.reader.consume(i + 1);
                        break;
                    }
                    None => {
                        writer.write_all(buf).temp_context(&path)?;
                        let n = buf.len();
                        self.reader.consume(n);
                    }
                }
            }
        }

        writer
            .into_inner()
            .map_err(|e| e.into_error())
            .temp_context(&path)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn split_all(content: &[u8], chunk_bytes: usize, read_buf: usize) -> (Arc<TempStore>, Vec<PathBuf>, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let input = dir.path().join("input.txt");
        fs::write(&input, content).expect("write input");

        let store = Arc::new(TempStore::create(None).expect("store"));
        let splitter = Splitter::new(chunk_bytes, read_buf, 4096);
        let runs: Vec<PathBuf> = splitter
            .split(&input, Arc::clone(&store))
            .expect("split")
            .map(|r| r.expect("run"))
            .collect();
        (store, runs, dir)
    }

    fn concat(runs: &[PathBuf]) -> Vec<u8> {
        let mut all = Vec::new();
        for run in runs {
            all.extend_from_slice(&fs::read(run).expect("read run"));
        }
        all
    }

    #[test]
    fn test_roundtrip_and_line_alignment() {
        let content = b"1. one\n2. two\n3. three\n4. four\n5. five\n";
        let (_store, runs, _dir) = split_all(content, 10, 8);

        assert!(runs.len() > 1);
        assert_eq!(concat(&runs), content.to_vec());
        for run in &runs {
            let bytes = fs::read(run).expect("read");
            assert_eq!(*bytes.last().expect("non-empty"), b'\n');
        }
    }

    #[test]
    fn test_run_size_bound() {
        // Longest line is 14 bytes; every run must stay under target + that
        let line = b"7. a dozen abc\n";
        let content: Vec<u8> = line.iter().copied().cycle().take(line.len() * 64).collect();
        let chunk = 40;
        let (_store, runs, _dir) = split_all(&content, chunk, 16);

        for run in &runs {
            let size = fs::metadata(run).expect("meta").len() as usize;
            assert!(size <= chunk + line.len(), "run of {size} bytes exceeds bound");
        }
        assert_eq!(concat(&runs), content);
    }

    #[test]
    fn test_unterminated_last_line_stays_unterminated() {
        let content = b"1. first\n2. second";
        let (_store, runs, _dir) = split_all(content, 1024, 512);

        assert_eq!(runs.len(), 1);
        assert_eq!(concat(&runs), content.to_vec());
    }

    #[test]
    fn test_crlf_passes_through() {
        let content = b"1. a\r\n2. b\r\n3. c\r\n";
        let (_store, runs, _dir) = split_all(content, 7, 4);

        assert_eq!(concat(&runs), content.to_vec());
        for run in &runs {
            let bytes = fs::read(run).expect("read");
            assert_eq!(*bytes.last().expect("non-empty"), b'\n');
        }
    }

    #[test]
    fn test_empty_input_emits_no_runs() {
        let (_store, runs, _dir) = split_all(b"", 1024, 512);
        assert!(runs.is_empty());
    }

    #[test]
    fn test_missing_input_is_input_error() {
        let store = Arc::new(TempStore::create(None).expect("store"));
        let splitter = Splitter::new(1024, 512, 512);
        let err = splitter
            .split(Path::new("/no/such/input.txt"), store)
            .err()
            .expect("must fail");
        assert!(matches!(
            err,
            crate::error::SortError::InputNotReadable { .. }
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_concatenation_reproduces_input(
            lines in proptest::collection::vec("[ -~]{0,40}", 0..60),
            terminated in any::<bool>(),
            chunk in 8usize..200,
            read_buf in 4usize..64,
        ) {
            let mut content = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                content.extend_from_slice(line.as_bytes());
                if i + 1 < lines.len() || terminated {
                    content.push(b'\n');
                }
            }

            let (_store, runs, _dir) = split_all(&content, chunk, read_buf);
            prop_assert_eq!(concat(&runs), content);

            // Every run except the last ends on a line boundary
            for run in runs.iter().rev().skip(1) {
                let bytes = fs::read(run).expect("read");
                prop_assert_eq!(*bytes.last().expect("non-empty"), b'\n');
            }
        }
    }
}
