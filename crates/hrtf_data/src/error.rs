use std::io;

/// Why loading an HRTF data file failed.
///
/// Limit violations are logged one by one as they are found, so a bad file reports every problem
/// in the failing stage; the error value itself only says which kind of failure stopped the load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The stream ended before the expected data.
    #[error("short read: {0}")]
    Io(#[from] io::Error),

    /// The 8-byte magic did not match any known format version.
    #[error("invalid header magic {0:?}")]
    InvalidHeader([u8; 8]),

    /// One or more data-set limits were violated.  Details have been logged.
    #[error("unsupported data")]
    InvalidData,

    /// A synthetic filename referred to an embedded resource that is not present.
    #[error("missing embedded resource {0}")]
    MissingResource(u32),
}
