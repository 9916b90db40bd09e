//! Line key parsing and the domain comparator
//!
//! Every line has the shape `<number>. <text>`; both the number and the
//! `". "` separator are optional. A missing or malformed prefix parses as
//! number 0 with the whole line as text, so parsing cannot fail.
//!
//! The total order is three lexicographic phases: text compared
//! case-insensitively, then an inverted case-sensitive tiebreak (lowercase
//! sorts before uppercase), then the numeric prefix.

use std::cmp::Ordering;

/// Parsed view of one line. Holds byte offsets into the line buffer rather
/// than owning text, so a key stays valid only as long as its line does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineKey {
    /// Parsed numeric prefix, 0 when absent or malformed
    pub number: i64,
    text_start: u32,
    text_len: u32,
}

impl LineKey {
    /// Parse the `N. text` prefix of `line` (newline already stripped).
    pub fn parse(line: &[u8]) -> Self {
        match memchr::memchr(b'.', line) {
            Some(p) if p > 0 => {
                let number = parse_i64(&line[..p])
                    .or_else(|| parse_u32(&line[..p]).map(i64::from))
                    .unwrap_or(0);
                let mut text_start = p + 1;
                while text_start < line.len() && line[text_start] == b' ' {
                    text_start += 1;
                }
                Self {
                    number,
                    text_start: text_start as u32,
                    text_len: (line.len() - text_start) as u32,
                }
            }
            _ => Self {
                number: 0,
                text_start: 0,
                text_len: line.len() as u32,
            },
        }
    }

    /// The text portion of `line`, which must be the buffer this key was
    /// parsed from.
    #[inline]
    pub fn text<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        &line[self.text_start as usize..(self.text_start + self.text_len) as usize]
    }
}

/// Checked signed-decimal parse; `None` on empty, stray bytes, or overflow.
fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let (negative, digits) = match bytes.first()? {
        b'-' => (true, &bytes[1..]),
        b'+' => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }

    let mut value: i64 = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?;
        value = value.checked_add((byte - b'0') as i64)?;
    }

    Some(if negative { -value } else { value })
}

/// Unsigned 32-bit fallback for prefixes the signed parse rejects.
fn parse_u32(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?;
        value = value.checked_add((byte - b'0') as u32)?;
    }
    Some(value)
}

/// Compare two parsed lines under the domain order.
///
/// Phase 1 compares text byte-wise with ASCII case folding; a shorter text
/// that prefixes the longer sorts less. Phase 2 runs only on fold-equal
/// texts (necessarily the same length) and inverts the raw byte order at
/// the first case-differing position, so `apple` < `Apple` < `APPLE`.
/// Phase 3 falls back to the numeric prefix.
pub fn compare(a_line: &[u8], a: &LineKey, b_line: &[u8], b: &LineKey) -> Ordering {
    let at = a.text(a_line);
    let bt = b.text(b_line);

    let common = at.len().min(bt.len());
    for i in 0..common {
        let fa = at[i].to_ascii_lowercase();
        let fb = bt[i].to_ascii_lowercase();
        if fa != fb {
            return fa.cmp(&fb);
        }
    }
    if at.len() != bt.len() {
        return at.len().cmp(&bt.len());
    }

    // Fold-equal texts: any raw difference is a pure case difference.
    for i in 0..common {
        if at[i] != bt[i] {
            return bt[i].cmp(&at[i]);
        }
    }

    a.number.cmp(&b.number)
}

/// Parse both lines and compare them. Convenience for merge readers that
/// hold raw lines rather than pre-parsed keys.
pub fn compare_lines(a: &[u8], b: &[u8]) -> Ordering {
    let ka = LineKey::parse(a);
    let kb = LineKey::parse(b);
    compare(a, &ka, b, &kb)
}
