//! In-memory sorting of one chunk of lines
//!
//! A chunk is a single contiguous buffer; lines are framed into
//! offset-based entries so the buffer is parsed once and never copied.
//! Sorting permutes the entry array only, keeping each key attached to
//! its line.

use crate::line_key::{self, LineKey};
use rayon::prelude::*;

/// Entry count above which the sort goes parallel
const PARALLEL_THRESHOLD: usize = 8192;

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// One line within a chunk buffer: byte range plus its parsed key
#[derive(Debug, Clone, Copy)]
pub struct KeyedLine {
    start: u32,
    len: u32,
    key: LineKey,
}

impl KeyedLine {
    /// The line bytes within `buf`, which must be the buffer this entry
    /// was parsed from.
    #[inline]
    pub fn line<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start as usize..(self.start + self.len) as usize]
    }

    #[inline]
    pub fn key(&self) -> &LineKey {
        &self.key
    }
}

/// Frame `buf` into keyed line entries.
///
/// Strips a UTF-8 BOM at buffer start and a CR before each LF; lines that
/// are empty after stripping are dropped. The final line may be
/// unterminated.
pub fn parse_buffer(buf: &[u8]) -> Vec<KeyedLine> {
    // ~24 bytes per line is typical for numbered-text data
    let mut entries = Vec::with_capacity(buf.len() / 24 + 1);

    let mut pos = if buf.starts_with(UTF8_BOM) {
        UTF8_BOM.len()
    } else {
        0
    };

    while pos < buf.len() {
        let end = match memchr::memchr(b'\n', &buf[pos..]) {
            Some(i) => pos + i,
            None => buf.len(),
        };
        let mut line_end = end;
        if line_end > pos && end < buf.len() && buf[line_end - 1] == b'\r' {
            line_end -= 1;
        }
        if line_end > pos {
            let line = &buf[pos..line_end];
            entries.push(KeyedLine {
                start: pos as u32,
                len: (line_end - pos) as u32,
                key: LineKey::parse(line),
            });
        }
        pos = end + 1;
    }

    entries
}

/// Sort `entries` in place into non-decreasing comparator order.
pub fn sort(buf: &[u8], entries: &mut [KeyedLine]) {
    let by_key = |a: &KeyedLine, b: &KeyedLine| {
        line_key::compare(a.line(buf), &a.key, b.line(buf), &b.key)
    };

    if entries.len() >= PARALLEL_THRESHOLD && num_cpus::get() > 1 {
        entries.par_sort_unstable_by(by_key);
    } else {
        entries.sort_unstable_by(by_key);
    }
}
