//! Configuration management for sort runs

use crate::error::{SortError, SortResult};
use std::path::PathBuf;
use std::str::FromStr;

/// Default split target: 64 MiB per run file
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024 * 1024;

/// Default maximum number of sorted inputs consumed by one merge pass
pub const DEFAULT_MERGE_FANOUT: usize = 128;

/// Default per-reader buffer size
pub const DEFAULT_READ_BUF_BYTES: usize = 40 * 1024;

/// Default per-writer buffer size
pub const DEFAULT_WRITE_BUF_BYTES: usize = 64 * 1024;

/// Merge backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeKind {
    /// Three-tape polyphase merge with Fibonacci run distribution.
    /// Two readers active at a time; best sequential-read locality.
    #[default]
    Polyphase,
    /// Heap-driven k-way merge; one reader per input up to the fanout.
    KWay,
}

impl FromStr for MergeKind {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polyphase" => Ok(MergeKind::Polyphase),
            "kway" | "k-way" => Ok(MergeKind::KWay),
            _ => Err(SortError::invalid_config(&format!(
                "unknown merge strategy: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for MergeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MergeKind::Polyphase => "polyphase",
            MergeKind::KWay => "kway",
        };
        write!(f, "{name}")
    }
}

/// Configuration for one sort run
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Target size of each split run in bytes; a run may exceed this by
    /// at most the length of one line (runs are never cut mid-line)
    pub chunk_bytes: usize,
    /// Maximum number of sorted inputs per merge pass
    pub merge_fanout: usize,
    /// Worker count for run sorting and for merging, each
    pub max_concurrency: usize,
    /// Directory for transient run files; system temp when unset
    pub temp_dir: Option<PathBuf>,
    /// Per-reader buffer size in bytes
    pub read_buf_bytes: usize,
    /// Per-writer buffer size in bytes
    pub write_buf_bytes: usize,
    /// Merge backend
    pub merge_kind: MergeKind,
    /// Retain the temp directory when the run is cancelled, to aid debugging
    pub keep_temp_on_cancel: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            merge_fanout: DEFAULT_MERGE_FANOUT,
            max_concurrency: num_cpus::get().min(4),
            temp_dir: None,
            read_buf_bytes: DEFAULT_READ_BUF_BYTES,
            write_buf_bytes: DEFAULT_WRITE_BUF_BYTES,
            merge_kind: MergeKind::default(),
            keep_temp_on_cancel: false,
        }
    }
}

impl SortConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    pub fn with_merge_fanout(mut self, merge_fanout: usize) -> Self {
        self.merge_fanout = merge_fanout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub fn with_merge_kind(mut self, merge_kind: MergeKind) -> Self {
        self.merge_kind = merge_kind;
        self
    }

    pub fn with_read_buf_bytes(mut self, read_buf_bytes: usize) -> Self {
        self.read_buf_bytes = read_buf_bytes;
        self
    }

    pub fn with_write_buf_bytes(mut self, write_buf_bytes: usize) -> Self {
        self.write_buf_bytes = write_buf_bytes;
        self
    }

    pub fn with_keep_temp_on_cancel(mut self, keep: bool) -> Self {
        self.keep_temp_on_cancel = keep;
        self
    }

    /// Validate option ranges before a run starts
    pub fn validate(&self) -> SortResult<()> {
        if self.chunk_bytes < 64 * 1024 {
            return Err(SortError::invalid_config(
                "chunk size too small (minimum 64KB)",
            ));
        }
        if self.chunk_bytes > 2 * 1024 * 1024 * 1024 {
            return Err(SortError::invalid_config(
                "chunk size too large (maximum 2GB)",
            ));
        }
        if self.merge_fanout < 2 {
            return Err(SortError::invalid_config("merge fanout must be at least 2"));
        }
        if self.merge_fanout > 1024 {
            return Err(SortError::invalid_config(
                "merge fanout too large (maximum 1024)",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(SortError::invalid_config("worker count must be positive"));
        }
        if self.max_concurrency > 256 {
            return Err(SortError::invalid_config(
                "too many workers (maximum 256)",
            ));
        }
        if self.read_buf_bytes < 1024 || self.write_buf_bytes < 1024 {
            return Err(SortError::invalid_config(
                "I/O buffer too small (minimum 1KB)",
            ));
        }
        Ok(())
    }

    /// Capacity of the two pipeline channels. Twice the worker count keeps
    /// every worker fed while still bounding queued run files.
    pub fn channel_capacity(&self) -> usize {
        self.max_concurrency * 2
    }
}

/// Parse a human-readable byte size like `64M`, `512K`, `1G`, or `1048576`.
///
/// A bare number is bytes; suffixes `b`, `K`, `M`, `G`, `T` multiply by
/// powers of 1024.
pub fn parse_size(raw: &str) -> SortResult<usize> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SortError::invalid_config("empty size"));
    }

    let (digits, multiplier) = match raw.as_bytes()[raw.len() - 1] {
        b'b' | b'B' => (&raw[..raw.len() - 1], 1usize),
        b'k' | b'K' => (&raw[..raw.len() - 1], 1024),
        b'm' | b'M' => (&raw[..raw.len() - 1], 1024 * 1024),
        b'g' | b'G' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        b't' | b'T' => (&raw[..raw.len() - 1], 1024usize.pow(4)),
        _ => (raw, 1),
    };

    let value: usize = digits
        .parse()
        .map_err(|_| SortError::invalid_config(&format!("invalid size: {raw}")))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| SortError::invalid_config(&format!("size out of range: {raw}")))
}

/// Builder for assembling a configuration from CLI flags
pub struct SortConfigBuilder {
    config: SortConfig,
}

impl SortConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SortConfig::default(),
        }
    }

    pub fn chunk_bytes(mut self, bytes: usize) -> Self {
        self.config.chunk_bytes = bytes;
        self
    }

    pub fn merge_fanout(mut self, fanout: usize) -> Self {
        self.config.merge_fanout = fanout;
        self
    }

    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.config.max_concurrency = workers;
        self
    }

    pub fn temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.temp_dir = Some(dir);
        self
    }

    pub fn merge_kind(mut self, kind: MergeKind) -> Self {
        self.config.merge_kind = kind;
        self
    }

    pub fn keep_temp_on_cancel(mut self) -> Self {
        self.config.keep_temp_on_cancel = true;
        self
    }

    pub fn build(self) -> SortResult<SortConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SortConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SortConfig::default();
        assert_eq!(config.chunk_bytes, DEFAULT_CHUNK_BYTES);
        assert_eq!(config.merge_fanout, DEFAULT_MERGE_FANOUT);
        assert_eq!(config.merge_kind, MergeKind::Polyphase);
        assert!(config.max_concurrency >= 1);
        assert!(config.max_concurrency <= 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SortConfigBuilder::new()
            .chunk_bytes(8 * 1024 * 1024)
            .merge_fanout(16)
            .merge_kind(MergeKind::KWay)
            .build()
            .expect("valid config");

        assert_eq!(config.chunk_bytes, 8 * 1024 * 1024);
        assert_eq!(config.merge_fanout, 16);
        assert_eq!(config.merge_kind, MergeKind::KWay);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(SortConfig::default()
            .with_chunk_bytes(1024)
            .validate()
            .is_err());
        assert!(SortConfig::default()
            .with_merge_fanout(1)
            .validate()
            .is_err());
        assert!(SortConfig::default()
            .with_max_concurrency(0)
            .validate()
            .is_err());
        assert!(SortConfig::default()
            .with_read_buf_bytes(16)
            .validate()
            .is_err());
    }

    #[test]
    fn test_merge_kind_from_str() {
        assert_eq!(
            "polyphase".parse::<MergeKind>().expect("parse"),
            MergeKind::Polyphase
        );
        assert_eq!("kway".parse::<MergeKind>().expect("parse"), MergeKind::KWay);
        assert_eq!(
            "k-way".parse::<MergeKind>().expect("parse"),
            MergeKind::KWay
        );
        assert!("bitonic".parse::<MergeKind>().is_err());
    }

    #[test]
    fn test_channel_capacity_tracks_concurrency() {
        let config = SortConfig::default().with_max_concurrency(3);
        assert_eq!(config.channel_capacity(), 6);
    }

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1048576").expect("parse"), 1048576);
        assert_eq!(parse_size("64b").expect("parse"), 64);
        assert_eq!(parse_size("40K").expect("parse"), 40 * 1024);
        assert_eq!(parse_size("64M").expect("parse"), 64 * 1024 * 1024);
        assert_eq!(parse_size("2g").expect("parse"), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("12Q").is_err());
        assert!(parse_size("-4K").is_err());
        assert!(parse_size("999999999999T").is_err());
    }
}
