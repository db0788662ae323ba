//! Central error types for the rewriting engine.
//!
//! Every failure poisons the document currently being written: the
//! downstream sink is left partially written and the caller has to discard
//! its output and restart the whole write. Nothing here is retried.

use core::fmt;
use std::borrow::Cow;

/// All errors raised by the writer, the configuration compiler and the
/// bundled sinks/drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A call sequence that violates the streaming-writer protocol, e.g. an
    /// `end_element` without an open element or an attribute outside any
    /// start tag.
    InvalidSequence {
        /// The operation that was called.
        operation: Cow<'static, str>,
        /// Why it is not allowed at this point.
        reason: Cow<'static, str>,
    },
    /// Malformed or inconsistent mapping configuration.
    Configuration(Cow<'static, str>),
    /// Writing to the underlying `std::io::Write` failed.
    Io(String),
    /// The input driver could not read the source document.
    XmlParse(String),
    /// Any other failure reported by a downstream sink.
    Sink(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSequence { operation, reason } => {
                if reason.is_empty() {
                    write!(f, "invalid call sequence: {operation}")
                } else {
                    write!(f, "invalid call sequence: {operation}: {reason}")
                }
            }
            Self::Configuration(msg) => write!(f, "invalid transform configuration: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::XmlParse(msg) => write!(f, "XML parse error: {msg}"),
            Self::Sink(msg) => write!(f, "sink error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl Error {
    /// Erstellt einen `InvalidSequence` Fehler mit Kontext.
    pub fn invalid_sequence(
        operation: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidSequence {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Erstellt einen `Configuration` Fehler mit Nachricht.
    pub fn configuration(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
