use crate::error::ConfigError;
use crate::records::{Record, record_key};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How an upstream nameserver is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Transport {
    Udp,
    #[default]
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        }
    }
}

impl TryFrom<String> for Transport {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" | "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            _ => Err(ConfigError::InvalidTransport(value)),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream resolver, tried in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Nameserver {
    /// `host:port`
    #[serde(rename = "Address", alias = "address")]
    pub address: String,

    #[serde(
        rename = "Timeout",
        alias = "timeout",
        default = "default_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,

    #[serde(rename = "Transport", alias = "transport", default)]
    pub transport: Transport,
}

impl Nameserver {
    pub fn new(address: impl Into<String>, timeout: Duration, transport: Transport) -> Self {
        Self {
            address: address.into(),
            timeout,
            transport,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_interface() -> String {
    "en0".to_string()
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parses Go-style duration strings such as `"300ms"`, `"2s"` or `"1m30s"`.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        total_nanos += value * nanos_per_unit;
        rest = &rest[unit_len..];
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    /// DNS port for both UDP and TCP
    #[serde(rename = "Port", alias = "port")]
    pub port: u16,

    /// Owned zone, normalized to a lower-case FQDN
    #[serde(rename = "Name", alias = "name")]
    pub name: String,

    /// Shared secret for mutating admin calls
    #[serde(rename = "Secret", alias = "secret", default)]
    pub secret: String,

    /// Initial record table, zone-relative keys
    #[serde(rename = "Records", alias = "records", default)]
    pub records: HashMap<String, Record>,

    /// Upstream nameservers in priority order
    #[serde(rename = "Nameservers", alias = "nameservers", default)]
    pub nameservers: Vec<Nameserver>,

    /// Address to bind and advertise; detected from `interface` when absent
    #[serde(rename = "Host", alias = "host", default)]
    pub host: Option<String>,

    /// Interface whose IPv4 address is used when `host` is absent
    #[serde(rename = "Interface", alias = "interface", default = "default_interface")]
    pub interface: String,

    /// Admin HTTP bind address
    #[serde(rename = "AdminAddr", alias = "admin_addr", default = "default_admin_addr")]
    pub admin_addr: SocketAddr,
}

impl ZoneConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parses, normalizes and validates a configuration document.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let mut config: ZoneConfig = serde_json::from_str(contents)?;
        config.normalize();
        config.validate()?;
        debug!(
            "Configuration: zone={}, port={}, records={}, nameservers={}",
            config.name,
            config.port,
            config.records.len(),
            config.nameservers.len()
        );
        Ok(config)
    }

    fn normalize(&mut self) {
        self.name = normalize_zone(&self.name);
        self.records = std::mem::take(&mut self.records)
            .into_iter()
            .map(|(name, record)| (name.to_lowercase(), record))
            .collect();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.contains("..") {
            return Err(ConfigError::InvalidZoneName(self.name.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for nameserver in &self.nameservers {
            if nameserver.address.trim().is_empty() {
                return Err(ConfigError::InvalidNameserver(
                    "Nameserver address must not be empty".to_string(),
                ));
            }
            if nameserver.timeout.is_zero() {
                return Err(ConfigError::InvalidNameserver(format!(
                    "Timeout for {} must be greater than 0",
                    nameserver.address
                )));
            }
        }

        for name in self.records.keys() {
            if record_key(name, &self.name).is_none() {
                return Err(ConfigError::InvalidRecordName(name.clone()));
            }
        }

        Ok(())
    }
}

/// Lower-case, fully-qualified form of a zone name. The root zone is `"."`.
pub fn normalize_zone(name: &str) -> String {
    let trimmed = name.trim().trim_matches('.').to_lowercase();
    if trimmed.is_empty() {
        if name.trim() == "." {
            return ".".to_string();
        }
        return String::new();
    }
    format!("{}.", trimmed)
}
