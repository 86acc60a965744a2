//! Device transport: the capability that actually talks to the strip.
//!
//! The control core treats the transport as a black box: it can open a
//! session to an endpoint and send a desired [`LedState`] over it. Both calls
//! may block (bounded by the transport's own timeout) and may fail.

mod command;
pub mod mock;

use std::fmt;
use std::time::Duration;

use crate::endpoint::DeviceEndpoint;
use crate::led::{self, LedState};

pub use command::{CommandSession, CommandTransport};

/// Transport failures.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the step that failed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Could not open a session to the device.
    Connect(String),
    /// The device dropped the session or rejected the command.
    Write(String),
    /// The operation did not complete within the given bound.
    Timeout(Duration),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(e) => write!(f, "Failed to connect to device: {e}"),
            TransportError::Write(e) => write!(f, "Write failed: {e}"),
            TransportError::Timeout(d) => write!(f, "Device did not respond within {d:?}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Opens sessions to a device and sends state changes over them.
///
/// Sessions are only ever used from the write lane that opened them.
pub trait DeviceTransport {
    type Session;

    fn open(&self, endpoint: &DeviceEndpoint) -> Result<Self::Session>;

    fn send(&self, session: &mut Self::Session, state: &LedState) -> Result<()>;
}

/// Transport that only logs the command plan. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTransport;

impl DeviceTransport for DryRunTransport {
    type Session = DeviceEndpoint;

    fn open(&self, endpoint: &DeviceEndpoint) -> Result<Self::Session> {
        Ok(endpoint.clone())
    }

    fn send(&self, session: &mut Self::Session, state: &LedState) -> Result<()> {
        let plan = led::plan_for(state);
        log::info!(
            "[dry-run] {} -> {state}: {}",
            session.identity(),
            serde_json::to_string(&plan).unwrap_or_default()
        );
        Ok(())
    }
}
