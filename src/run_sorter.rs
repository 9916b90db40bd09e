//! Pipeline adapter from unsorted runs to sorted runs
//!
//! Loads one run file, sorts it in memory with the chunk sorter, writes
//! the sorted counterpart, and deletes the original. Memory use per run
//! is bounded by the splitter's size target plus per-line entry overhead.

use crate::chunk_sort;
use crate::error::{IoContext, SortResult};
use crate::line_io::LineWriter;
use crate::temp_store::TempStore;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

pub struct RunSorter {
    write_buf_bytes: usize,
}

impl RunSorter {
    pub fn new(write_buf_bytes: usize) -> Self {
        Self { write_buf_bytes }
    }

    /// Sort one run file and return the sorted path. The unsorted input
    /// is deleted once the sorted file is durable.
    pub fn sort_run(&self, unsorted: &Path, store: &TempStore) -> SortResult<PathBuf> {
        let file = File::open(unsorted).temp_context(unsorted)?;
        // Runs are read front to back exactly once
        let mmap = unsafe { Mmap::map(&file) }.temp_context(unsorted)?;
        #[cfg(unix)]
        let _ = mmap.advise(memmap2::Advice::Sequential);

        let mut entries = chunk_sort::parse_buffer(&mmap);
        chunk_sort::sort(&mmap, &mut entries);

        let sorted = store.new_sorted_path();
        let mut writer = LineWriter::create(&sorted, self.write_buf_bytes).temp_context(&sorted)?;
        for entry in &entries {
            writer.write_line(entry.line(&mmap)).temp_context(&sorted)?;
        }
        writer.finish().temp_context(&sorted)?;

        drop(mmap);
        store.delete_best_effort(unsorted);
        Ok(sorted)
    }
}
