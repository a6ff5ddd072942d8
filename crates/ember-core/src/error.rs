//! Error types for `ember-core`.

use thiserror::Error;

/// Ember's crate-wide error type, one variant per failure category.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed frame or an unknown prefix byte inside an array.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Wrong argument count, an unparseable integer, or an unknown subcommand.
    #[error("{0}")]
    Argument(String),

    /// The snapshot file is structurally invalid.
    #[error("Format error: {0}")]
    Format(String),

    /// The snapshot's trailing CRC-64 does not match the computed checksum.
    #[error("Checksum mismatch: expected {expected:#018x}, got {actual:#018x}")]
    Checksum {
        /// Checksum stored in the file's trailing 8 bytes.
        expected: u64,
        /// Checksum recomputed over the file's prefix.
        actual: u64,
    },

    /// File or socket I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
