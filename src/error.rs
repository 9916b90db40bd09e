//! Error handling for the external sort engine

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type covering every way a sort run can fail
#[derive(Error, Debug)]
pub enum SortError {
    #[error("cannot read input {}: {source}", path.display())]
    InputNotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("temp file I/O failed: {0}")]
    TempIo(#[from] io::Error),

    #[error("cannot write output {}: {source} (sorted data retained at {})", path.display(), retained.display())]
    OutputNotWritable {
        path: PathBuf,
        retained: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sort cancelled")]
    Cancelled,

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SortError {
    /// Exit code reported to the shell for this error
    pub fn exit_code(&self) -> i32 {
        crate::EXIT_FAILURE
    }

    pub fn invalid_config(message: &str) -> Self {
        SortError::InvalidConfig {
            message: message.to_string(),
        }
    }

    /// True when the pipeline stopped on a cancellation rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SortError::Cancelled)
    }
}

/// Result type for sort operations
pub type SortResult<T> = Result<T, SortError>;

/// Maps raw I/O results into the right `SortError` kind with a path attached
pub trait IoContext<T> {
    /// Failure to open or read the user-supplied input file
    fn input_context(self, path: &Path) -> SortResult<T>;

    /// Failure on a transient file under the temp directory
    fn temp_context(self, path: &Path) -> SortResult<T>;
}

impl<T> IoContext<T> for Result<T, io::Error> {
    fn input_context(self, path: &Path) -> SortResult<T> {
        self.map_err(|source| SortError::InputNotReadable {
            path: path.to_path_buf(),
            source,
        })
    }

    fn temp_context(self, path: &Path) -> SortResult<T> {
        self.map_err(|io_err| {
            SortError::TempIo(io::Error::new(
                io_err.kind(),
                format!("{}: {}", path.display(), io_err),
            ))
        })
    }
}
