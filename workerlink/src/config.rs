//! Client configuration: peer endpoint, timeouts, retry budget.
//!
//! A [`Config`] is usually loaded from a JSON file and then overlaid with
//! environment variables. Any field missing from the file keeps its default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};
use workerlink_proto::DEFAULT_ENDPOINT;

use crate::{Error, Result};

/// Environment variable overriding [`Config::endpoint`].
pub const ENV_ENDPOINT: &str = "WORKERLINK_ENDPOINT";

/// Environment variable overriding [`Config::transport`].
pub const ENV_TRANSPORT: &str = "WORKERLINK_TRANSPORT";

/// Environment variable overriding [`Config::port_file`].
pub const ENV_PORT_FILE: &str = "WORKERLINK_PORT_FILE";

/// Default per-attempt reply timeout.
pub const REQUEST_TIMEOUT_MS: u64 = 2500;

/// Default retry budget per exchange.
pub const REQUEST_RETRIES: u32 = 3;

/// Default idle task tick.
pub const IDLE_INTERVAL_SECS: u64 = 60;

/// A `tcp://host:port` peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Host part (name, IPv4 literal, or bracketed IPv6 literal).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the same host with a different port.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }

    /// `host:port`, suitable for name resolution.
    pub(crate) fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5555,
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::Config(format!("invalid endpoint {s:?}, want tcp://host:port"));
        let rest = s.strip_prefix("tcp://").ok_or_else(bad)?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(bad)?;
        if host.is_empty() {
            return Err(bad());
        }
        let port = port.parse().map_err(|_| bad())?;
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// Socket type used to reach the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TransportKind {
    /// ZeroMQ REQ socket, which the worker speaks natively.
    #[default]
    Zmq,
    /// Length-prefixed frames over a plain TCP stream.
    Tcp,
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zmq" => Ok(Self::Zmq),
            "tcp" => Ok(Self::Tcp),
            other => Err(Error::Config(format!(
                "unknown transport {other:?}, want zmq or tcp"
            ))),
        }
    }
}

/// Settings for a [`Client`](crate::Client) and its supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
    /// Peer endpoint.
    pub endpoint: Endpoint,
    /// Socket type.
    pub transport: TransportKind,
    /// File the worker writes its negotiated port into. When set, the port
    /// it holds replaces the port of `endpoint`.
    pub port_file: Option<PathBuf>,
    /// How long one attempt waits for a reply.
    pub request_timeout_ms: u64,
    /// Attempts allowed per exchange before giving up.
    pub request_retries: u32,
    /// Idle task tick.
    pub idle_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.parse().unwrap_or_default(),
            transport: TransportKind::default(),
            port_file: None,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            request_retries: REQUEST_RETRIES,
            idle_interval_secs: IDLE_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies [`ENV_ENDPOINT`], [`ENV_TRANSPORT`] and [`ENV_PORT_FILE`]
    /// from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(endpoint) = var(ENV_ENDPOINT) {
            self.endpoint = endpoint.parse()?;
        }
        if let Some(transport) = var(ENV_TRANSPORT) {
            self.transport = transport.parse()?;
        }
        if let Some(path) = var(ENV_PORT_FILE) {
            self.port_file = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.request_retries == 0 {
            return Err(Error::Config("request_retries must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.idle_interval_secs == 0 {
            return Err(Error::Config("idle_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Final endpoint, with the port taken from `port_file` when configured.
    pub fn resolve_endpoint(&self) -> Result<Endpoint> {
        match &self.port_file {
            Some(path) => Ok(self.endpoint.with_port(read_port_file(path)?)),
            None => Ok(self.endpoint.clone()),
        }
    }

    /// Per-attempt reply timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Idle task tick.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

/// Reads a decimal port number written by the worker.
pub fn read_port_file(path: &Path) -> Result<u16> {
    let text = fs::read_to_string(path)?;
    text.trim()
        .parse()
        .ok()
        .filter(|&port| port != 0)
        .ok_or_else(|| Error::Config(format!("{}: not a port number", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoints() {
        let e: Endpoint = "tcp://localhost:5555".parse().unwrap();
        assert_eq!((e.host(), e.port()), ("localhost", 5555));

        let v6: Endpoint = "tcp://[::1]:7000".parse().unwrap();
        assert_eq!(v6.host(), "[::1]");
        assert_eq!(v6.authority(), "[::1]:7000");
        assert_eq!(v6.to_string(), "tcp://[::1]:7000");

        for bad in ["localhost:5555", "tcp://localhost", "tcp://:5555", "tcp://h:99999"] {
            assert!(bad.parse::<Endpoint>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let c = Config::default();
        assert_eq!(c.endpoint.to_string(), DEFAULT_ENDPOINT);
        assert_eq!(c.request_timeout(), Duration::from_millis(2500));
        assert_eq!(c.request_retries, 3);
        assert_eq!(c.transport, TransportKind::Zmq);
        c.validate().unwrap();
    }

    #[test]
    fn loads_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workerlink.json");
        fs::write(
            &path,
            r#"{ "endpoint": "tcp://127.0.0.1:6000", "transport": "tcp", "request_retries": 5 }"#,
        )
        .unwrap();

        let c = Config::load(&path).unwrap();
        assert_eq!(c.endpoint.port(), 6000);
        assert_eq!(c.transport, TransportKind::Tcp);
        assert_eq!(c.request_retries, 5);
        assert_eq!(c.request_timeout_ms, REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workerlink.json");

        fs::write(&path, r#"{ "request_retries": 0 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));

        fs::write(&path, r#"{ "endpoint": "udp://x:1" }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));

        fs::write(&path, r#"{ "transport": "udp" }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));

        fs::write(&path, r#"{ "retries": 2 }"#).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn port_file_overrides_endpoint_port() {
        let dir = tempfile::tempdir().unwrap();
        let port_file = dir.path().join("worker.port");
        fs::write(&port_file, "40123\n").unwrap();

        let c = Config {
            port_file: Some(port_file.clone()),
            ..Config::default()
        };
        let endpoint = c.resolve_endpoint().unwrap();
        assert_eq!(endpoint.to_string(), "tcp://localhost:40123");

        fs::write(&port_file, "not-a-port").unwrap();
        assert!(matches!(c.resolve_endpoint(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_port_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = Config {
            port_file: Some(dir.path().join("absent.port")),
            ..Config::default()
        };
        assert!(matches!(c.resolve_endpoint(), Err(Error::Io(_))));
    }

    #[test]
    fn env_vars_override_file_values() {
        let c = Config::default()
            .apply_vars(|key| match key {
                ENV_ENDPOINT => Some("tcp://10.0.0.2:5600".into()),
                ENV_TRANSPORT => Some("tcp".into()),
                ENV_PORT_FILE => Some("/run/worker.port".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(c.endpoint.to_string(), "tcp://10.0.0.2:5600");
        assert_eq!(c.transport, TransportKind::Tcp);
        assert_eq!(c.port_file.as_deref(), Some(Path::new("/run/worker.port")));

        let bad = Config::default()
            .apply_vars(|key| (key == ENV_ENDPOINT).then(|| "nope".to_owned()));
        assert!(bad.is_err());
    }
}
