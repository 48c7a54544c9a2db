/// DNS Response Code constants from RFC 1035
pub struct DNSRcode;

impl DNSRcode {
    pub const NOERROR: u8 = 0; // No error
    pub const FORMERR: u8 = 1; // Format error
    pub const SERVFAIL: u8 = 2; // Server failure
}

/// Payload limit for UDP replies when the client did not advertise one.
pub const DEFAULT_UDP_PAYLOAD: u16 = 512;

/// Receive buffer of the UDP listener.
pub const MAX_UDP_MESSAGE: usize = 4096;

/// Receive buffer for upstream UDP replies. Relayed queries keep the
/// client's EDNS payload size, so replies can be as large as a datagram.
pub const MAX_UPSTREAM_MESSAGE: usize = 65535;

/// TTL of the authority NS record attached to authoritative replies.
pub const AUTHORITY_TTL: u32 = 3600;
