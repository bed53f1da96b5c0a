//! Error handling for nowplayd.
//!
//! Provides a unified error type based on gRPC status codes, with mapping
//! from the underlying library errors to appropriate categories. Module
//! seams that need richer classification (the gateway's fetch outcome, the
//! poll loop's termination cause) define their own `thiserror` enums and
//! convert into this type at the crate boundary.

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for nowplayd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// Each variant maps to a specific HTTP status code and represents a
/// distinct failure category. See
/// [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// HTTP Mapping: 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// HTTP Mapping: 504 Gateway Timeout
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP Mapping: 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// HTTP Mapping: 409 Conflict
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// HTTP Mapping: 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP Mapping: 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// HTTP Mapping: 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// HTTP Mapping: 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// HTTP Mapping: 400 Bad Request
    #[error("out of range")]
    OutOfRange = 11,

    /// HTTP Mapping: 501 Not Implemented
    #[error("not implemented")]
    Unimplemented = 12,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// HTTP Mapping: 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

macro_rules! constructor {
    ($(#[$meta:meta])* $name:ident, $kind:ident) => {
        $(#[$meta])*
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    constructor!(
        /// Creates an error for operations interrupted mid-execution.
        aborted,
        Aborted
    );
    constructor!(
        /// Creates an error for duplicate resource creation attempts.
        already_exists,
        AlreadyExists
    );
    constructor!(
        /// Creates an error for cancelled operations.
        cancelled,
        Cancelled
    );
    constructor!(
        /// Creates an error for data corruption or loss.
        data_loss,
        DataLoss
    );
    constructor!(
        /// Creates an error for operations that exceeded their deadline,
        /// such as a network call running into its timeout.
        deadline_exceeded,
        DeadlineExceeded
    );
    constructor!(
        /// Creates an error for operations that failed due to current state.
        failed_precondition,
        FailedPrecondition
    );
    constructor!(
        /// Creates an error for unexpected internal failures.
        internal,
        Internal
    );
    constructor!(
        /// Creates an error for arguments that fail validation.
        invalid_argument,
        InvalidArgument
    );
    constructor!(
        /// Creates an error for missing resources.
        not_found,
        NotFound
    );
    constructor!(
        /// Creates an error for values outside valid range.
        out_of_range,
        OutOfRange
    );
    constructor!(
        /// Creates an error for callers lacking necessary permissions.
        permission_denied,
        PermissionDenied
    );
    constructor!(
        /// Creates an error for exhausted resources or quota, including
        /// remote rate limiting.
        resource_exhausted,
        ResourceExhausted
    );
    constructor!(
        /// Creates an error for authentication failures: invalid
        /// credentials, expired tokens, or rejected refresh tokens.
        unauthenticated,
        Unauthenticated
    );
    constructor!(
        /// Creates an error for temporarily unavailable services.
        unavailable,
        Unavailable
    );
    constructor!(
        /// Creates an error for unimplemented features.
        unimplemented,
        Unimplemented
    );
    constructor!(
        /// Creates an error that fits no other category.
        unknown,
        Unknown
    );
}

/// Returns the underlying error source, so chains can be examined for
/// root causes.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display as "{kind}: {details}".
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts HTTP client errors based on their nature: body errors become
/// `DataLoss`, decode errors `InvalidArgument`, connect errors
/// `Unavailable`, timeouts `DeadlineExceeded`.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_connect() || err.is_request() {
            return Self::unavailable(err);
        }

        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if let Some(status) = err.status() {
            if status.is_client_error() {
                return Self::invalid_argument(err);
            }
            if status.is_server_error() {
                return Self::unavailable(err);
            }
        }

        Self::unknown(err)
    }
}

/// JSON that fails to parse means a malformed remote document.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(err)
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(err: std::net::AddrParseError) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<axum::Error> for Error {
    fn from(err: axum::Error) -> Self {
        Self::aborted(err)
    }
}
