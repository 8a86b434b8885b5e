use std::net::SocketAddr;

use mjcast_hub::DEFAULT_CLIENT_QUEUE;
use thiserror::Error;

pub const DEFAULT_GROUP: &str = "224.0.0.250:5000";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{var}={value:?} is invalid: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Proxy settings, read from `MJCAST_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub addr: String,
    pub iface: Option<String>,
    pub http_addr: SocketAddr,
    pub client_queue: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let value = get("MJCAST_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.into());
        let http_addr: SocketAddr = value.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError {
            var: "MJCAST_HTTP_ADDR",
            reason: e.to_string(),
            value: value.clone(),
        })?;
        let client_queue = match get("MJCAST_CLIENT_QUEUE") {
            None => DEFAULT_CLIENT_QUEUE,
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError {
                    var: "MJCAST_CLIENT_QUEUE",
                    reason: e.to_string(),
                    value,
                })?
                .max(1),
        };

        Ok(Self {
            addr: get("MJCAST_ADDR").unwrap_or_else(|| DEFAULT_GROUP.into()),
            iface: get("MJCAST_IFACE"),
            http_addr,
            client_queue,
        })
    }
}
