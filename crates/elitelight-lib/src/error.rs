//! Unified error type for the elitelight-lib crate.
//!
//! [`ElitelightError`] wraps module-specific errors (`TransportError`) and
//! domain-specific error kinds (`Config`, `Color`, `NotApplied`). `From` impls
//! allow `?` to propagate across module boundaries.

use std::fmt;

use crate::controller::ControlOutcome;
use crate::transport::TransportError;

/// Unified error type for elitelight-lib operations.
#[derive(Debug)]
pub enum ElitelightError {
    /// Device transport error (open, send, timeout).
    Transport(TransportError),
    /// Standard I/O error (file read/write, config persistence).
    Io(std::io::Error),
    /// Configuration validation error (endpoint, mapping, timings).
    Config(String),
    /// Colour, scene or speed parsing error.
    Color(String),
    /// A control request finished without the state being applied.
    NotApplied(ControlOutcome),
}

impl fmt::Display for ElitelightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElitelightError::Transport(e) => write!(f, "{e}"),
            ElitelightError::Io(e) => write!(f, "I/O error: {e}"),
            ElitelightError::Config(e) => write!(f, "Config error: {e}"),
            ElitelightError::Color(e) => write!(f, "Color error: {e}"),
            ElitelightError::NotApplied(outcome) => write!(f, "LED not updated: {outcome}"),
        }
    }
}

impl std::error::Error for ElitelightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ElitelightError::Transport(e) => Some(e),
            ElitelightError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ElitelightError {
    fn from(e: TransportError) -> Self {
        ElitelightError::Transport(e)
    }
}

impl From<std::io::Error> for ElitelightError {
    fn from(e: std::io::Error) -> Self {
        ElitelightError::Io(e)
    }
}

/// Crate-level Result alias using [`ElitelightError`].
pub type Result<T> = std::result::Result<T, ElitelightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_transport_error() {
        let e: ElitelightError = TransportError::Connect("refused".into()).into();
        assert!(matches!(
            e,
            ElitelightError::Transport(TransportError::Connect(_))
        ));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: ElitelightError = io_err.into();
        assert!(matches!(e, ElitelightError::Io(_)));
    }

    #[test]
    fn display_config_error() {
        let e = ElitelightError::Config("device_host is empty".into());
        assert_eq!(e.to_string(), "Config error: device_host is empty");
    }

    #[test]
    fn display_color_error() {
        let e = ElitelightError::Color("bad hex".into());
        assert_eq!(e.to_string(), "Color error: bad hex");
    }

    #[test]
    fn display_not_applied() {
        let e = ElitelightError::NotApplied(ControlOutcome::SkippedUnreachable);
        assert_eq!(e.to_string(), "LED not updated: device unreachable");
    }

    #[test]
    fn source_chains_transport_error() {
        let e = ElitelightError::Transport(TransportError::Write("dropped".into()));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("dropped"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = ElitelightError::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_transport_to_crate() {
        fn inner() -> std::result::Result<(), TransportError> {
            Err(TransportError::Timeout(std::time::Duration::from_secs(2)))
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(
            err,
            ElitelightError::Transport(TransportError::Timeout(_))
        ));
    }
}
