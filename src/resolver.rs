use crate::config::{Nameserver, Transport};
use crate::dns::DNSPacket;
use crate::dns::constants::MAX_UPSTREAM_MESSAGE;
use crate::dns::question::DNSQuestion;
use crate::dns::resource::DNSResource;
use crate::error::{DnsError, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Reply from one upstream nameserver: the bytes as received and their
/// decoded form.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub raw: Vec<u8>,
    pub packet: DNSPacket,
}

/// Forwards questions the zone does not own to the configured upstream
/// nameservers, strictly in configuration order.
#[derive(Debug, Clone)]
pub struct Recursor {
    nameservers: Vec<Nameserver>,
}

impl Recursor {
    pub fn new(nameservers: Vec<Nameserver>) -> Self {
        info!(
            "Recursor initialized with {} upstream nameservers",
            nameservers.len()
        );
        debug!("Upstream nameservers: {:?}", nameservers);
        Self { nameservers }
    }

    /// Resolves a batch of questions. Each nameserver gets one query holding
    /// every question still pending; answered names leave the pending set.
    /// Returns every answer collected, in arrival order. Questions nobody
    /// answered are simply missing from the result.
    pub async fn resolve(&self, questions: &[DNSQuestion]) -> Vec<DNSResource> {
        let mut pending: Vec<DNSQuestion> = questions.to_vec();
        let mut answers = Vec::new();

        for nameserver in &self.nameservers {
            if pending.is_empty() {
                break;
            }

            let mut query = DNSPacket::default();
            query.header.id = rand::random::<u16>();
            query.header.rd = true;
            query.questions = pending.clone();

            let query_bytes = match query.serialize() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to serialize upstream query: {}", e);
                    break;
                }
            };

            match exchange(nameserver, &query_bytes, query.header.id).await {
                Ok(response) => {
                    let received = response.packet.answers;
                    pending.retain(|question| {
                        let name = question.name();
                        !received
                            .iter()
                            .any(|answer| answer.name().eq_ignore_ascii_case(&name))
                    });
                    debug!(
                        "{} answered {} records, {} questions still pending",
                        nameserver.address,
                        received.len(),
                        pending.len()
                    );
                    answers.extend(received);
                }
                Err(e) => {
                    warn!("DNS resolve via {} failed: {}", nameserver.address, e);
                }
            }
        }

        answers
    }

    /// Forwards a client query unchanged and returns the first upstream
    /// reply, truncated or not. Fails only when every nameserver failed.
    pub async fn forward(&self, query: &[u8]) -> Result<UpstreamResponse> {
        let id = message_id(query)?;

        for (attempt, nameserver) in self.nameservers.iter().enumerate() {
            let started = Instant::now();
            match exchange(nameserver, query, id).await {
                Ok(response) => {
                    debug!(
                        "Recurse RTT via {} (attempt {}): {:?}",
                        nameserver.address,
                        attempt + 1,
                        started.elapsed()
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Recurse via {} failed: {}", nameserver.address, e);
                }
            }
        }

        Err(DnsError::UpstreamExhausted(self.nameservers.len()))
    }
}

fn message_id(message: &[u8]) -> Result<u16> {
    match message {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(DnsError::Parse("message shorter than its id".to_string())),
    }
}

/// One query/response exchange with `nameserver` over its configured
/// transport. The whole exchange, address lookup included, is bounded by the
/// nameserver's timeout. A truncated reply counts as a success.
pub async fn exchange(nameserver: &Nameserver, query: &[u8], id: u16) -> Result<UpstreamResponse> {
    let exchange_future = async {
        let addr = tokio::net::lookup_host(nameserver.address.as_str())
            .await
            .map_err(|_| DnsError::NameserverAddress(nameserver.address.clone()))?
            .next()
            .ok_or_else(|| DnsError::NameserverAddress(nameserver.address.clone()))?;

        trace!(
            "Sending {} bytes to upstream {} over {}",
            query.len(),
            addr,
            nameserver.transport
        );

        match nameserver.transport {
            Transport::Udp => send_udp_query(query, addr, id).await,
            Transport::Tcp => send_tcp_query(query, addr, id).await,
        }
    };

    let raw = timeout(nameserver.timeout, exchange_future)
        .await
        .map_err(|_| DnsError::Timeout {
            server: nameserver.address.clone(),
            timeout: nameserver.timeout,
        })??;

    let packet = DNSPacket::parse(&raw).map_err(|e| {
        debug!(
            "Failed to parse response from {}: {} (first bytes: {:02x?})",
            nameserver.address,
            e,
            &raw[..raw.len().min(64)]
        );
        DnsError::Parse(format!("Failed to parse response: {}", e))
    })?;

    if !packet.is_response() {
        return Err(DnsError::NotAResponse(nameserver.address.clone()));
    }
    if packet.header.tc {
        debug!("Truncated response from {}, using it as is", nameserver.address);
    }

    Ok(UpstreamResponse { raw, packet })
}

/// Send a query over a fresh UDP socket, skipping datagrams with another id.
async fn send_udp_query(query_bytes: &[u8], upstream_addr: SocketAddr, id: u16) -> Result<Vec<u8>> {
    let local: SocketAddr = if upstream_addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(upstream_addr).await?;
    socket.send(query_bytes).await?;

    let mut response_buf = vec![0u8; MAX_UPSTREAM_MESSAGE];
    loop {
        let response_len = socket.recv(&mut response_buf).await?;
        if message_id(&response_buf[..response_len]).ok() == Some(id) {
            response_buf.truncate(response_len);
            return Ok(response_buf);
        }
        debug!(
            "Discarding {} byte datagram with mismatched id from {}",
            response_len, upstream_addr
        );
    }
}

/// Send a length-prefixed query over TCP.
async fn send_tcp_query(query_bytes: &[u8], upstream_addr: SocketAddr, id: u16) -> Result<Vec<u8>> {
    let query_length = u16::try_from(query_bytes.len())
        .map_err(|_| DnsError::MessageTooLarge(query_bytes.len()))?;

    let mut stream = TcpStream::connect(upstream_addr).await?;
    stream.write_all(&query_length.to_be_bytes()).await?;
    stream.write_all(query_bytes).await?;
    stream.flush().await?;

    let mut length_buf = [0u8; 2];
    stream.read_exact(&mut length_buf).await?;
    let response_length = u16::from_be_bytes(length_buf) as usize;

    let mut response_buf = vec![0; response_length];
    stream.read_exact(&mut response_buf).await?;

    if message_id(&response_buf)? != id {
        return Err(DnsError::Parse(format!(
            "Response id from {} does not match query id {}",
            upstream_addr, id
        )));
    }
    Ok(response_buf)
}
