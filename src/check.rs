//! Sorted-order verification
//!
//! Streams a file once and reports the first adjacent pair that breaks
//! the comparator order. Used by the `check` subcommand and handy in
//! tests as an oracle for pipeline output.

use crate::error::{IoContext, SortResult};
use crate::line_io::LineReader;
use crate::line_key::{self, LineKey};
use std::cmp::Ordering;
use std::path::Path;

/// Outcome of a sortedness scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Sorted { lines: u64 },
    /// 1-based index (counting non-blank lines) of the first line that
    /// sorts before its predecessor
    Disorder { line: u64 },
}

impl CheckOutcome {
    pub fn is_sorted(&self) -> bool {
        matches!(self, CheckOutcome::Sorted { .. })
    }
}

/// Scan `path` and verify it is non-decreasing under the comparator.
pub fn check_sorted(path: &Path, read_buf_bytes: usize) -> SortResult<CheckOutcome> {
    let mut reader = LineReader::open(path, read_buf_bytes).input_context(path)?;

    let mut prev: Vec<u8> = Vec::new();
    let mut prev_key = LineKey::parse(&prev);
    let mut have_prev = false;
    let mut line: Vec<u8> = Vec::new();
    let mut count: u64 = 0;

    while reader.read_line(&mut line).input_context(path)? {
        count += 1;
        let key = LineKey::parse(&line);
        if have_prev && line_key::compare(&prev, &prev_key, &line, &key) == Ordering::Greater {
            return Ok(CheckOutcome::Disorder { line: count });
        }
        std::mem::swap(&mut prev, &mut line);
        prev_key = key;
        have_prev = true;
    }

    Ok(CheckOutcome::Sorted { lines: count })
}
