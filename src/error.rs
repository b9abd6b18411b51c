// Error taxonomy shared by every layer of the crate.
//
// Core failures fall into five kinds (format, config, range, permission,
// type). Higher layers wrap lower-level errors with context instead of
// replacing them, so `Error::kind()` always reports the original cause.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// HEX record errors
// ---------------------------------------------------------------------------

/// Why a single Intel-HEX record could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("damaged record, does not begin with ':'")]
    MissingStartCode,

    #[error("fractured byte at index {index}")]
    FracturedByte { index: usize },

    #[error("corrupt byte at index {index}")]
    CorruptByte { index: usize },

    #[error("record does not contain whole bytes")]
    OddDigitCount,

    #[error("record too short ({len} bytes)")]
    TooShort { len: usize },

    #[error("checksum error (encoded: {encoded:#04X}, actual: {actual:#04X})")]
    Checksum { encoded: u8, actual: u8 },

    #[error("encoded data length ({declared}) does not match payload length ({actual})")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("extended linear address record must carry 2 bytes, got {0}")]
    ExtendedAddressLength(usize),

    #[error("record type {0:#04X} not supported")]
    UnsupportedRecordType(u8),
}

// ---------------------------------------------------------------------------
// Crate error
// ---------------------------------------------------------------------------

/// Coarse classification of an [`Error`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Config,
    Range,
    Permission,
    Type,
    Io,
}

/// Every failure the library can report.
#[derive(Error, Debug)]
pub enum Error {
    /// A HEX record could not be decoded; `record` is 1-based.
    #[error("hex record #{record}: {source}")]
    Format {
        record: usize,
        #[source]
        source: HexError,
    },

    /// Invalid region, variable or CPU configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Address outside a region, or not cell-aligned.
    #[error("{0}")]
    Range(String),

    /// Read from a non-readable or write to a non-writeable region.
    #[error("{0}")]
    Permission(String),

    /// Value incompatible with a variable's declared type or shape.
    #[error("{0}")]
    Type(String),

    /// Another error with the operation that was being attempted.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wrap `self` with a description of the failing operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The taxonomy bucket of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } => ErrorKind::Format,
            Self::Config(_) | Self::Yaml(_) => ErrorKind::Config,
            Self::Range(_) => ErrorKind::Range,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Type(_) => ErrorKind::Type,
            Self::Context { source, .. } => source.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Adds `.context(..)` to any `Result` whose error converts into [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Into::<Error>::into(e).context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Into::<Error>::into(e).context(f()))
    }
}
