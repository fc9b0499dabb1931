// Crate-wide error type plus the stable mappings to host status codes and CLI exit codes.
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Status returned to hosts when a path resolves to nothing.
pub const STATUS_NOT_FOUND: i32 = -libc::ENOENT;

pub const STATUS_OPEN_NOT_INITIALIZED: i32 = -70001;
pub const STATUS_OPEN_WRONG_KIND: i32 = -70002;
pub const STATUS_OPEN_UNABLE_TO_LOAD: i32 = -70003;
pub const STATUS_OPEN_WRITE_REQUIRED: i32 = -70004;

pub const STATUS_INIT_INVALID_FLAGS: i32 = -80001;
pub const STATUS_INIT_LOAD_FAILED: i32 = -80002;
pub const STATUS_INIT_INVALID_DATA: i32 = -80003;
pub const STATUS_INIT_ALREADY_INITIALIZED: i32 = -80004;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    AlreadyInitialized,
    InvalidFlags,
    LoadFailed,
    InvalidData,
    NotInitialized,
    NotFound,
    WrongKind,
    WriteRequired,
    UnableToLoad,
    Os,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    errno: Option<i32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            errno: None,
            source: None,
        }
    }

    /// Classifies an OS error. `ENOENT` becomes `NotFound`; errors without an errno
    /// also collapse to `NotFound`, which is what hosts expect for "nothing usable here".
    pub fn from_io(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) if code == libc::ENOENT => Self::new(ErrorKind::NotFound).with_source(err),
            Some(code) => Self::new(ErrorKind::Os).with_errno(code).with_source(err),
            None => Self::new(ErrorKind::NotFound).with_source(err),
        }
    }

    pub fn os(errno: i32) -> Self {
        Self::new(ErrorKind::Os).with_errno(errno)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(errno) = self.errno {
            write!(f, " (errno: {errno})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Maps an error to the negative status code returned across the host boundary.
pub fn to_status_code(err: &Error) -> i32 {
    match err.kind {
        ErrorKind::AlreadyInitialized => STATUS_INIT_ALREADY_INITIALIZED,
        ErrorKind::InvalidFlags => STATUS_INIT_INVALID_FLAGS,
        ErrorKind::LoadFailed => STATUS_INIT_LOAD_FAILED,
        ErrorKind::InvalidData => STATUS_INIT_INVALID_DATA,
        ErrorKind::NotInitialized => STATUS_OPEN_NOT_INITIALIZED,
        ErrorKind::NotFound => STATUS_NOT_FOUND,
        ErrorKind::WrongKind => STATUS_OPEN_WRONG_KIND,
        ErrorKind::WriteRequired => STATUS_OPEN_WRITE_REQUIRED,
        ErrorKind::UnableToLoad => STATUS_OPEN_UNABLE_TO_LOAD,
        ErrorKind::Os => match err.errno {
            Some(errno) if errno > 0 => -errno,
            _ => STATUS_NOT_FOUND,
        },
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Os => 1,
        ErrorKind::InvalidFlags => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyInitialized => 4,
        ErrorKind::NotInitialized => 5,
        ErrorKind::WriteRequired => 6,
        ErrorKind::InvalidData => 7,
        ErrorKind::LoadFailed => 8,
        ErrorKind::WrongKind => 9,
        ErrorKind::UnableToLoad => 10,
    }
}
