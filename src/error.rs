//! Transport error classification.
//!
//! The fetcher reports failures as [`RawError`]; the pager only ever hands
//! [`ErrorKind`] to its callers. Only [`ErrorKind::UnresolvedAddress`] is
//! considered recoverable by waiting for connectivity to come back.

use std::error::Error as StdError;

/// Failure as reported by the transport, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RawError {
  /// The server answered with a non-2xx status
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
  /// No connection could be established (DNS, refused, unreachable, connect timeout)
  #[error("{0}")]
  Io(String),
  /// Anything else: decode failures, malformed requests, ...
  #[error("{0}")]
  Other(String),
}

/// Closed set of errors surfaced to consumers of the pager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
  #[error("Resource not found")]
  NotFound,
  #[error("Unauthorized")]
  Unauthorized,
  #[error("Server error")]
  ServerError,
  #[error("No network connection")]
  UnresolvedAddress,
  #[error("{0}")]
  Unknown(String),
}

impl ErrorKind {
  /// Whether the surrounding app may retry on its own once the network is back.
  pub fn is_recoverable_by_reconnect(&self) -> bool {
    matches!(self, ErrorKind::UnresolvedAddress)
  }
}

/// Map a transport failure into the error taxonomy.
pub fn classify(raw: &RawError) -> ErrorKind {
  match raw {
    RawError::Http { status: 404, .. } => ErrorKind::NotFound,
    RawError::Http {
      status: 401 | 403, ..
    } => ErrorKind::Unauthorized,
    RawError::Http {
      status: 500..=599, ..
    } => ErrorKind::ServerError,
    RawError::Http { .. } => ErrorKind::Unknown(raw.to_string()),
    RawError::Io(_) => ErrorKind::UnresolvedAddress,
    RawError::Other(message) => ErrorKind::Unknown(message.clone()),
  }
}

impl From<reqwest::Error> for RawError {
  fn from(err: reqwest::Error) -> Self {
    if let Some(status) = err.status() {
      return RawError::Http {
        status: status.as_u16(),
        message: status
          .canonical_reason()
          .unwrap_or("unexpected status")
          .to_string(),
      };
    }

    // A timeout while reading the body means bytes already arrived.
    let no_connection = err.is_connect() || (err.is_timeout() && !err.is_body());
    if no_connection || (!err.is_decode() && has_io_source(&err)) {
      return RawError::Io(err.to_string());
    }

    RawError::Other(err.to_string())
  }
}

/// Walk the source chain looking for an I/O failure.
fn has_io_source(err: &(dyn StdError + 'static)) -> bool {
  let mut source = err.source();
  while let Some(cause) = source {
    if cause.is::<std::io::Error>() {
      return true;
    }
    source = cause.source();
  }
  false
}
