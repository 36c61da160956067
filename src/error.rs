//! Error types for k-nearest-neighbor computation.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that can occur while loading a dataset or running a backend.
#[derive(Debug)]
pub enum KnnError {
    /// The dataset file could not be opened or read.
    Io { path: PathBuf, source: io::Error },

    /// Reading operator input or writing the report failed.
    Console(io::Error),

    /// The dataset or its shape is unusable (zero dimension, ragged points).
    InvalidDataset(String),

    /// The run configuration does not fit the loaded data (e.g. `k >= n`).
    InvalidConfig(String),

    /// A backend could not acquire its parallel resources
    /// (device memory, worker pool, child processes).
    ResourceAcquisition {
        backend: &'static str,
        message: String,
    },

    /// A process-group peer sent something unexpected or hung up mid-collective.
    Transport(String),
}

impl KnnError {
    pub(crate) fn resource(backend: &'static str, message: impl Into<String>) -> Self {
        KnnError::ResourceAcquisition {
            backend,
            message: message.into(),
        }
    }
}

impl fmt::Display for KnnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnnError::Io { path, source } => {
                write!(f, "error opening file {}: {}", path.display(), source)
            }
            KnnError::Console(source) => write!(f, "console I/O failed: {}", source),
            KnnError::InvalidDataset(msg) => write!(f, "invalid dataset: {}", msg),
            KnnError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            KnnError::ResourceAcquisition { backend, message } => {
                write!(f, "{} backend initialization failed: {}", backend, message)
            }
            KnnError::Transport(msg) => write!(f, "process group transport failed: {}", msg),
        }
    }
}

impl std::error::Error for KnnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnnError::Io { source, .. } | KnnError::Console(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_backend() {
        let err = KnnError::resource("device", "out of memory");
        assert_eq!(
            err.to_string(),
            "device backend initialization failed: out of memory"
        );
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;

        let err = KnnError::Io {
            path: PathBuf::from("missing.csv"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("missing.csv"));
    }

    #[test]
    fn test_console_error_is_not_a_file_error() {
        use std::error::Error;

        let err = KnnError::Console(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        assert_eq!(err.to_string(), "console I/O failed: pipe closed");
        assert!(!err.to_string().contains("file"));
        assert!(err.source().is_some());
    }
}
