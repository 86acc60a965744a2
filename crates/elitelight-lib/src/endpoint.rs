//! Device endpoint: the identity and address of the LED strip.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::Serialize;

/// Default Tuya local control port.
pub const DEFAULT_PORT: u16 = 6668;

/// Default local protocol version.
pub const DEFAULT_PROTOCOL_VERSION: &str = "3.3";

/// Identity of a device: host plus device id.
///
/// Reachability records and write lanes are keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub host: String,
    pub id: String,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.host)
    }
}

/// A validated, immutable device endpoint.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEndpoint {
    id: String,
    host: String,
    #[serde(skip)]
    ip: IpAddr,
    #[serde(skip)]
    local_key: String,
    protocol_version: String,
    port: u16,
}

// Hand-written so the local key never ends up in logs.
impl fmt::Debug for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEndpoint")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("local_key", &"<redacted>")
            .field("protocol_version", &self.protocol_version)
            .field("port", &self.port)
            .finish()
    }
}

impl DeviceEndpoint {
    /// Build an endpoint, rejecting malformed fields before any I/O happens.
    ///
    /// `host` must be an IP literal; host names are rejected so that no
    /// later call ever blocks on name resolution. An empty
    /// `protocol_version` falls back to [`DEFAULT_PROTOCOL_VERSION`].
    pub fn new(
        id: &str,
        host: &str,
        local_key: &str,
        protocol_version: &str,
        port: u16,
    ) -> crate::error::Result<Self> {
        let id = id.trim();
        let host = host.trim();
        let local_key = local_key.trim();
        let protocol_version = match protocol_version.trim() {
            "" => DEFAULT_PROTOCOL_VERSION,
            v => v,
        };

        if id.is_empty() {
            return Err(config_err("device id is empty"));
        }
        if host.is_empty() {
            return Err(config_err("device host is empty"));
        }
        let Ok(ip) = host.parse::<IpAddr>() else {
            return Err(config_err(format!(
                "device host must be an IP address, got {host:?}"
            )));
        };
        if local_key.is_empty() {
            return Err(config_err("local key is empty"));
        }
        if !is_valid_protocol_version(protocol_version) {
            return Err(config_err(format!(
                "protocol version must look like 3.3, got {protocol_version:?}"
            )));
        }
        if port == 0 {
            return Err(config_err("device port must not be 0"));
        }

        Ok(DeviceEndpoint {
            id: id.to_string(),
            host: host.to_string(),
            ip,
            local_key: local_key.to_string(),
            protocol_version: protocol_version.to_string(),
            port,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Address the strip listens on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            host: self.host.clone(),
            id: self.id.clone(),
        }
    }
}

fn config_err(msg: impl Into<String>) -> crate::ElitelightError {
    crate::ElitelightError::Config(msg.into())
}

/// `major.minor`, both numeric.
fn is_valid_protocol_version(v: &str) -> bool {
    match v.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
