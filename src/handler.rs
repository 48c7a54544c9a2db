use crate::authority::Authority;
use crate::config::Transport;
use crate::dns::DNSPacket;
use crate::resolver::Recursor;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A reply ready to be encoded for the client.
enum Reply {
    Built(DNSPacket),
    /// Upstream reply passed through byte for byte.
    Relayed { raw: Vec<u8>, packet: DNSPacket },
}

/// Routes decoded queries: names in the owned zone go to the [`Authority`],
/// everything else is passed through to the upstream nameservers.
#[derive(Debug, Clone)]
pub struct QueryHandler {
    authority: Arc<Authority>,
    recursor: Arc<Recursor>,
}

impl QueryHandler {
    pub fn new(authority: Arc<Authority>, recursor: Arc<Recursor>) -> Self {
        Self {
            authority,
            recursor,
        }
    }

    /// Handles one wire-format request and returns the wire-format reply, or
    /// `None` when the request is dropped without an answer.
    pub async fn handle(
        &self,
        request_bytes: &[u8],
        transport: Transport,
        client: SocketAddr,
    ) -> Option<Vec<u8>> {
        let request = match DNSPacket::parse(request_bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Malformed {} packet from {}: {}", transport, client, e);
                return malformed_query_reply(request_bytes);
            }
        };

        if request.is_response() {
            debug!("Ignoring response message from {}", client);
            return None;
        }

        let reply = match request.questions.first() {
            None => {
                debug!("Query id={} has no questions, returning FORMERR", request.header.id);
                Reply::Built(DNSPacket::formerr_response(&request))
            }
            Some(question) if self.authority.is_authoritative_for(&question.name()) => {
                debug!("Authoritative query from {}: {}", client, question);
                Reply::Built(self.authority.answer(&request).await)
            }
            Some(question) => {
                debug!("Recursive query from {}: {}", client, question);
                match self.recursor.forward(request_bytes).await {
                    Ok(response) => Reply::Relayed {
                        raw: response.raw,
                        packet: response.packet,
                    },
                    Err(e) => {
                        warn!(
                            "All resolvers failed for {:?} from client {} ({}): {}",
                            request
                                .questions
                                .iter()
                                .map(|q| q.to_string())
                                .collect::<Vec<_>>(),
                            client,
                            transport,
                            e
                        );
                        Reply::Built(DNSPacket::servfail_response(&request))
                    }
                }
            }
        };

        encode_reply(reply, &request, transport)
    }
}

/// Encodes the reply, falling back to a truncated reply when a UDP client
/// cannot take the full message.
fn encode_reply(reply: Reply, request: &DNSPacket, transport: Transport) -> Option<Vec<u8>> {
    let limit = match transport {
        Transport::Udp => request.max_udp_payload_size() as usize,
        Transport::Tcp => u16::MAX as usize,
    };

    let (bytes, packet) = match reply {
        Reply::Relayed { raw, packet } => (Ok(raw), packet),
        Reply::Built(packet) => (packet.serialize(), packet),
    };

    match bytes {
        Ok(bytes) if bytes.len() <= limit => Some(bytes),
        Ok(bytes) => {
            debug!(
                "Response too large for {} ({}>{} bytes), sending truncated response",
                transport,
                bytes.len(),
                limit
            );
            serialize_or_log(&packet.truncated())
        }
        Err(e) => {
            error!("Failed to serialize response id={}: {}", packet.header.id, e);
            serialize_or_log(&DNSPacket::servfail_response(request))
        }
    }
}

/// FORMERR for a message whose header is a readable query but whose body is
/// not. Anything else is dropped.
fn malformed_query_reply(request_bytes: &[u8]) -> Option<Vec<u8>> {
    let header = DNSPacket::parse_header(request_bytes).ok()?;
    if header.qr {
        return None;
    }
    let request = DNSPacket {
        header,
        ..Default::default()
    };
    serialize_or_log(&DNSPacket::formerr_response(&request))
}

fn serialize_or_log(packet: &DNSPacket) -> Option<Vec<u8>> {
    match packet.serialize() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to serialize response id={}: {}", packet.header.id, e);
            None
        }
    }
}
