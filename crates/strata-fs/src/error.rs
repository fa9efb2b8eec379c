//! Error types for strata stores

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum FsError {
    NotFound(String),
    AlreadyExists(String),
    NotADirectory(String),
    IsDirectory(String),
    /// Write attempted after the store was frozen
    Locked,
    InvalidArgument(String),
    /// Invariant violation; never retried
    Internal(String),
    Io(Box<io::Error>),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, FsError::AlreadyExists(_))
    }

    /// Convert an I/O error from an operation on `path`, naming the path
    /// instead of the OS message in the typed variants
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_string()),
            _ => FsError::Io(Box::new(err)),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound(path) => write!(f, "Not found: {}", path),
            FsError::AlreadyExists(path) => write!(f, "Already exists: {}", path),
            FsError::NotADirectory(path) => write!(f, "Not a directory: {}", path),
            FsError::IsDirectory(path) => write!(f, "Is a directory: {}", path),
            FsError::Locked => write!(f, "Store is locked from writing"),
            FsError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            FsError::Internal(msg) => write!(f, "Internal error: {}", msg),
            FsError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(err.to_string()),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(err.to_string()),
            _ => FsError::Io(Box::new(err)),
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        let kind = match &err {
            FsError::NotFound(_) => io::ErrorKind::NotFound,
            FsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            FsError::Locked => io::ErrorKind::PermissionDenied,
            FsError::InvalidArgument(_)
            | FsError::NotADirectory(_)
            | FsError::IsDirectory(_) => io::ErrorKind::InvalidInput,
            FsError::Io(inner) => return io::Error::new(inner.kind(), inner.to_string()),
            FsError::Internal(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
