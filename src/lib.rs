pub mod authority;
pub mod config;
pub mod dns;
pub mod error;
pub mod handler;
pub mod host;
pub mod http_server;
pub mod records;
pub mod resolver;
pub mod server;

pub use dns::DNSPacket;
