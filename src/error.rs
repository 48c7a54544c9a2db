use std::time::Duration;

use thiserror::Error;

use crate::dns::ParseError;

#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Upstream {server} timed out after {timeout:?}")]
    Timeout { server: String, timeout: Duration },

    #[error("Upstream {0} sent a message that is not a response")]
    NotAResponse(String),

    #[error("Could not resolve nameserver address {0}")]
    NameserverAddress(String),

    #[error("Message of {0} bytes does not fit TCP framing")]
    MessageTooLarge(usize),

    #[error("All {0} upstream nameservers failed")]
    UpstreamExhausted(usize),

    #[error("{0} listener stopped")]
    ListenerStopped(&'static str),
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

impl From<ParseError> for DnsError {
    fn from(err: ParseError) -> Self {
        DnsError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;

/// Startup failures; all of them are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid zone name: {0:?}")]
    InvalidZoneName(String),

    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("Illegal value for transport {0:?}")]
    InvalidTransport(String),

    #[error("Invalid nameserver: {0}")]
    InvalidNameserver(String),

    #[error("Invalid record name {0:?}")]
    InvalidRecordName(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Could not determine address of interface {interface}: {reason}")]
    HostDetection { interface: String, reason: String },
}
