//! Transport that delegates each write to an external bridge program.
//!
//! The bridge (for example a small tinytuya script) receives the endpoint in
//! environment variables and a JSON document on stdin:
//!
//! ```json
//! { "state": { "kind": "solid_color", "r": 255, "g": 0, "b": 0 },
//!   "plan":  [ { "op": "set_mode", "mode": "colour" }, ... ] }
//! ```
//!
//! Exit status 0 means the strip accepted the change; anything else is a
//! rejected write. The process is killed when it exceeds the write timeout.

use std::io::{Read, Write};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;

use super::{DeviceTransport, Result, TransportError};
use crate::endpoint::DeviceEndpoint;
use crate::hooks;
use crate::led::{self, DeviceOp, LedState};

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT: usize = 200;

#[derive(Debug, Clone)]
pub struct CommandTransport {
    command: String,
    timeout: Duration,
}

/// Environment handed to every bridge invocation for one endpoint.
#[derive(Debug, Clone)]
pub struct CommandSession {
    env: Vec<(&'static str, String)>,
}

#[derive(Serialize)]
struct BridgeInput<'a> {
    state: &'a LedState,
    plan: Vec<DeviceOp>,
}

impl CommandTransport {
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.trim().to_string(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl DeviceTransport for CommandTransport {
    type Session = CommandSession;

    fn open(&self, endpoint: &DeviceEndpoint) -> Result<Self::Session> {
        if self.command.is_empty() {
            return Err(TransportError::Connect(
                "transport_command: not configured".into(),
            ));
        }
        Ok(CommandSession {
            env: vec![
                ("ELITELIGHT_DEVICE_ID", endpoint.id().to_string()),
                ("ELITELIGHT_DEVICE_HOST", endpoint.host().to_string()),
                ("ELITELIGHT_DEVICE_PORT", endpoint.port().to_string()),
                ("ELITELIGHT_LOCAL_KEY", endpoint.local_key().to_string()),
                (
                    "ELITELIGHT_PROTOCOL_VERSION",
                    endpoint.protocol_version().to_string(),
                ),
            ],
        })
    }

    fn send(&self, session: &mut Self::Session, state: &LedState) -> Result<()> {
        let input = BridgeInput {
            state,
            plan: led::plan_for(state),
        };
        let payload = serde_json::to_vec(&input)
            .map_err(|e| TransportError::Write(format!("encode plan: {e}")))?;

        let mut child = hooks::shell(&self.command)
            .envs(session.env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Connect(format!("spawn {}: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A bridge that exits without reading stdin is judged by its exit status.
            if let Err(e) = stdin.write_all(&payload) {
                log::debug!("bridge did not read its input: {e}");
            }
        }

        let status = hooks::wait_with_timeout(&mut child, self.timeout)
            .map_err(|e| TransportError::Write(format!("wait for bridge: {e}")))?;

        match status {
            None => Err(TransportError::Timeout(self.timeout)),
            Some(s) if s.success() => Ok(()),
            Some(s) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    Err(TransportError::Write(format!("bridge: exited with {s}")))
                } else {
                    let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
                    Err(TransportError::Write(format!(
                        "bridge: exited with {s}: {excerpt}"
                    )))
                }
            }
        }
    }
}
