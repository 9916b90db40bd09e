//! Buffered line framing shared by the run sorter and the mergers
//!
//! Readers strip the terminator (LF or CRLF), strip a UTF-8 BOM at stream
//! start, and drop lines that are empty after stripping. Writers terminate
//! every line with the platform newline, including what was an
//! unterminated final input line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Platform line terminator used for all emitted files
#[cfg(windows)]
pub const NEWLINE: &[u8] = b"\r\n";
#[cfg(not(windows))]
pub const NEWLINE: &[u8] = b"\n";

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// Pull-based line reader over a buffered file stream
pub struct LineReader {
    reader: BufReader<File>,
    at_start: bool,
}

impl LineReader {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::with_capacity(buf_bytes, file),
            at_start: true,
        })
    }

    /// Read the next non-empty line into `buf` (cleared first), without its
    /// terminator. Returns `Ok(false)` at end of stream.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        loop {
            buf.clear();
            let n = self.reader.read_until(b'\n', buf)?;
            if n == 0 {
                return Ok(false);
            }

            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }

            if self.at_start {
                self.at_start = false;
                if buf.starts_with(UTF8_BOM) {
                    buf.drain(..UTF8_BOM.len());
                }
            }

            if !buf.is_empty() {
                return Ok(true);
            }
        }
    }
}

/// Buffered line writer that appends the platform terminator
pub struct LineWriter {
    writer: BufWriter<File>,
}

impl LineWriter {
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(buf_bytes, file),
        })
    }

    #[inline]
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.writer.write_all(line)?;
        self.writer.write_all(NEWLINE)
    }

    /// Flush buffered data out to the file. Must be called before the path
    /// is handed to a reader.
    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
