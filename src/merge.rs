//! Merge strategies over sorted run files
//!
//! A strategy consumes a batch of sorted runs and produces exactly one
//! sorted run under the temp store. Strategies never delete their inputs;
//! the caller owns input lifecycle. Intermediate files a strategy creates
//! for its own recursion are its responsibility and are removed on both
//! success and failure.

use crate::error::{IoContext, SortResult};
use crate::line_io::{LineReader, LineWriter};
use crate::line_key::{self, LineKey};
use crate::temp_store::TempStore;
use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;

/// Capability to merge sorted runs into one sorted run
pub trait MergeStrategy: Send + Sync {
    /// Merge `inputs` (each non-decreasing under the comparator) into a
    /// single sorted run owned by `store`. Inputs are left in place.
    fn merge(&self, inputs: &[PathBuf], store: &TempStore) -> SortResult<PathBuf>;
}

/// Heap entry pairing a line with the reader it came from
struct MergeEntry {
    line: Vec<u8>,
    key: LineKey,
    source: usize,
}

impl MergeEntry {
    fn new(line: Vec<u8>, source: usize) -> Self {
        let key = LineKey::parse(&line);
        Self { line, key, source }
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        line_key::compare(&self.line, &self.key, &other.line, &other.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Heap-driven merge of up to `fanout` runs at a time
///
/// Batches above the fanout are partitioned, the groups merged in
/// parallel, and the group outputs merged recursively.
pub struct KWayMerge {
    fanout: usize,
    read_buf_bytes: usize,
    write_buf_bytes: usize,
}

impl KWayMerge {
    pub fn new(fanout: usize, read_buf_bytes: usize, write_buf_bytes: usize) -> Self {
        Self {
            fanout,
            read_buf_bytes,
            write_buf_bytes,
        }
    }

    /// Streaming merge of one batch, all readers open at once.
    fn merge_batch(&self, inputs: &[PathBuf], store: &TempStore) -> SortResult<PathBuf> {
        let output = store.new_merge_path();

        let mut readers = Vec::with_capacity(inputs.len());
        for path in inputs {
            readers.push(LineReader::open(path, self.read_buf_bytes).temp_context(path)?);
        }
        let mut writer = LineWriter::create(&output, self.write_buf_bytes).temp_context(&output)?;

        let mut heap: BinaryHeap<Reverse<MergeEntry>> = BinaryHeap::with_capacity(readers.len());
        for (source, reader) in readers.iter_mut().enumerate() {
            let mut line = Vec::new();
            if reader.read_line(&mut line).temp_context(&inputs[source])? {
                heap.push(Reverse(MergeEntry::new(line, source)));
            }
        }

        while let Some(Reverse(entry)) = heap.pop() {
            writer.write_line(&entry.line).temp_context(&output)?;

            let source = entry.source;
            // Reuse the popped entry's allocation for the refill
            let mut line = entry.line;
            if readers[source]
                .read_line(&mut line)
                .temp_context(&inputs[source])?
            {
                heap.push(Reverse(MergeEntry::new(line, source)));
            }
        }

        writer.finish().temp_context(&output)?;
        Ok(output)
    }
}

impl MergeStrategy for KWayMerge {
    fn merge(&self, inputs: &[PathBuf], store: &TempStore) -> SortResult<PathBuf> {
        if inputs.len() <= self.fanout {
            return self.merge_batch(inputs, store);
        }

        // Too wide for one pass: merge fanout-sized groups in parallel,
        // then reduce the group outputs.
        let results: Vec<SortResult<PathBuf>> = inputs
            .par_chunks(self.fanout)
            .map(|group| self.merge_batch(group, store))
            .collect();

        let mut intermediates = Vec::with_capacity(results.len());
        let mut first_err = None;
        for result in results {
            match result {
                Ok(path) => intermediates.push(path),
                Err(err) if first_err.is_none() => first_err = Some(err),
                Err(_) => {}
            }
        }

        let outcome = match first_err {
            Some(err) => Err(err),
            None => self.merge(&intermediates, store),
        };
        for path in &intermediates {
            store.delete_best_effort(path);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_io::NEWLINE;
    use std::fs;
    use std::str;

    fn write_run(store: &TempStore, lines: &[&str]) -> PathBuf {
        let path = store.new_sorted_path();
        let mut content = Vec::new();
        for line in lines {
            content.extend_from_slice(line.as_bytes());
            content.extend_from_slice(NEWLINE);
        }
        fs::write(&path, content).expect("write run");
        path
    }

    fn read_lines(path: &PathBuf) -> Vec<String> {
        let content = fs::read(path).expect("read");
        let nl = str::from_utf8(NEWLINE).expect("newline");
        String::from_utf8(content)
            .expect("utf8")
            .split(nl)
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_merge_two_runs() {
        let store = TempStore::create(None).expect("store");
        let a = write_run(&store, &["1. Apple", "3. Cat"]);
        let b = write_run(&store, &["2. Apple", "5. Banana"]);

        let strategy = KWayMerge::new(8, 4096, 4096);
        let merged = strategy.merge(&[a.clone(), b.clone()], &store).expect("merge");

        assert_eq!(
            read_lines(&merged),
            vec!["1. Apple", "2. Apple", "5. Banana", "3. Cat"]
        );
        // Inputs belong to the caller
        assert!(a.exists());
        assert!(b.exists());
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let store = TempStore::create(None).expect("store");
        let a = write_run(&store, &["5. Banana"]);
        let b = write_run(&store, &["5. Banana"]);

        let strategy = KWayMerge::new(8, 4096, 4096);
        let merged = strategy.merge(&[a, b], &store).expect("merge");

        assert_eq!(read_lines(&merged), vec!["5. Banana", "5. Banana"]);
    }

    #[test]
    fn test_merge_single_input_copies_into_store() {
        let store = TempStore::create(None).expect("store");
        let a = write_run(&store, &["1. x", "2. y"]);

        let strategy = KWayMerge::new(8, 4096, 4096);
        let merged = strategy.merge(&[a.clone()], &store).expect("merge");

        assert_ne!(merged, a);
        assert_eq!(merged.extension().and_then(|e| e.to_str()), Some("merged"));
        assert_eq!(read_lines(&merged), vec!["1. x", "2. y"]);
    }

    #[test]
    fn test_recursive_merge_above_fanout_cleans_intermediates() {
        let store = TempStore::create(None).expect("store");
        let inputs: Vec<PathBuf> = (0..5)
            .map(|i| write_run(&store, &[&format!("{i}. apple")]))
            .collect();

        let strategy = KWayMerge::new(2, 4096, 4096);
        let merged = strategy.merge(&inputs, &store).expect("merge");

        assert_eq!(
            read_lines(&merged),
            vec!["0. apple", "1. apple", "2. apple", "3. apple", "4. apple"]
        );

        // Only the inputs and the final output remain in the store
        let mut remaining: Vec<PathBuf> = fs::read_dir(store.dir())
            .expect("read dir")
            .map(|e| e.expect("entry").path())
            .collect();
        remaining.sort();
        let mut expected: Vec<PathBuf> = inputs.into_iter().chain([merged]).collect();
        expected.sort();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_merge_missing_input_fails_and_cleans_up() {
        let store = TempStore::create(None).expect("store");
        let good: Vec<PathBuf> = (0..3)
            .map(|i| write_run(&store, &[&format!("{i}. pear")]))
            .collect();
        let mut inputs = good.clone();
        inputs.push(store.dir().join("gone.sorted"));

        let strategy = KWayMerge::new(2, 4096, 4096);
        assert!(strategy.merge(&inputs, &store).is_err());

        // No intermediate survivors beyond the caller-owned inputs
        let remaining: Vec<PathBuf> = fs::read_dir(store.dir())
            .expect("read dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(remaining.len(), good.len());
    }

    #[test]
    fn test_case_tiebreak_across_runs() {
        let store = TempStore::create(None).expect("store");
        let a = write_run(&store, &["10. Apple", "10. APPLE"]);
        let b = write_run(&store, &["5. apple"]);

        let strategy = KWayMerge::new(8, 4096, 4096);
        let merged = strategy.merge(&[a, b], &store).expect("merge");

        assert_eq!(
            read_lines(&merged),
            vec!["5. apple", "10. Apple", "10. APPLE"]
        );
    }
}
