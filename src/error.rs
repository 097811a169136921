use std::io;

use thiserror::Error;

/// Result alias used throughout the archive engine.
pub type ZipResult<T> = Result<T, ZipError>;

/// Errors surfaced by the archive engine.
#[derive(Debug, Error)]
pub enum ZipError {
    /// The bytes on disk are not a usable ZIP archive (missing EOCD, truncated
    /// or corrupt header).
    #[error("invalid zip archive: {0}")]
    InvalidArchive(String),

    /// An entry uses a compression method other than Stored or Deflated.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// The backing store cannot provide the access an operation needs.
    #[error("backing store lacks {0} access")]
    MissingCapability(&'static str),

    /// No entry with this name exists in the archive.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A size, offset or count does not fit the classic 32-bit format.
    #[error("zip32 limit exceeded: {0}")]
    Zip32Limit(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ZipError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ZipError::InvalidArchive(msg.into())
    }

    /// Whether this error means the archive itself is malformed.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ZipError::InvalidArchive(_) | ZipError::UnsupportedCompression(_)
        )
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => e,
            ZipError::EntryNotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_are_grouped() {
        assert!(ZipError::invalid("EOCD not found").is_format_error());
        assert!(ZipError::UnsupportedCompression(12).is_format_error());
        assert!(!ZipError::EntryNotFound("a".into()).is_format_error());
        assert!(!ZipError::MissingCapability("write").is_format_error());
    }

    #[test]
    fn converts_into_io_error() {
        let err: io::Error = ZipError::EntryNotFound("a.txt".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = ZipError::invalid("bad").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
