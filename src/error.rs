//! Errors that cross the connection/worker boundary.
//!
//! Protocol-level failures (malformed requests, internal handler errors, fatal
//! network errors) never surface as `Result::Err` out of the state machine —
//! the connection converts each of those in place into a terminating response
//! or a release of the connection (see `connection::Connection::io_event`).
//! `ConnectionError` exists only for the setup paths where a `Result` is the
//! idiomatic shape: binding a socket, registering with `mio::Poll`, loading
//! configuration.

use std::fmt::{self, Display};
use std::io;

use crate::parser::h1::ParseError;

/// Failures that can occur outside the per-request protocol state machine.
#[derive(Debug)]
pub enum ConnectionError {
    /// The underlying socket operation failed.
    Io(io::Error),
    /// Configuration could not be parsed or was invalid.
    Config(String),
    /// A parse failure occurred outside of the normal header-reading state,
    /// e.g. while validating a chunk extension during response encoding.
    Parse(ParseError),
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(err) => write!(f, "io error: {err}"),
            ConnectionError::Config(msg) => write!(f, "configuration error: {msg}"),
            ConnectionError::Parse(err) => write!(f, "parse error: {err}"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Io(err) => Some(err),
            ConnectionError::Config(_) => None,
            ConnectionError::Parse(err) => Some(err),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(err)
    }
}

impl From<ParseError> for ConnectionError {
    fn from(err: ParseError) -> Self {
        ConnectionError::Parse(err)
    }
}

/// Result alias for setup paths that legitimately propagate a `ConnectionError`.
pub type Result<T> = std::result::Result<T, ConnectionError>;
