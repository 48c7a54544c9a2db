//! Shared helpers for the integration tests: a scriptable upstream
//! nameserver, a running server on loopback, and small query clients.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use zonedns::authority::Authority;
use zonedns::config::{Nameserver, Transport};
use zonedns::dns::DNSPacket;
use zonedns::dns::enums::{DNSResourceClass, DNSResourceType};
use zonedns::dns::question::DNSQuestion;
use zonedns::dns::resource::{DNSResource, DNSResourceData};
use zonedns::handler::QueryHandler;
use zonedns::records::{Record, RecordStore};
use zonedns::resolver::Recursor;
use zonedns::server::ListenerPool;

pub const ZONE: &str = "example.com.";
pub const HOST: &str = "192.168.1.10";
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How a mock upstream reacts to queries.
#[derive(Clone)]
pub enum Behavior {
    /// Answer every question found in the table with one A record.
    Answer(HashMap<String, Ipv4Addr>),
    /// Like `Answer`, then append `extra` records and optionally set TC.
    Decorated {
        table: HashMap<String, Ipv4Addr>,
        extra: Vec<(String, Ipv4Addr)>,
        truncated: bool,
    },
    /// Answer every question with this many distinct A records.
    Flood(usize),
    /// Receive queries but never reply.
    Silent,
}

impl Behavior {
    pub fn answering(entries: &[(&str, Ipv4Addr)]) -> Self {
        Behavior::Answer(table(entries))
    }

    /// Truncated reply that also carries records nobody asked for.
    pub fn truncated_with_extra(
        entries: &[(&str, Ipv4Addr)],
        extra: &[(&str, Ipv4Addr)],
    ) -> Self {
        Behavior::Decorated {
            table: table(entries),
            extra: extra
                .iter()
                .map(|(name, addr)| (name.to_string(), *addr))
                .collect(),
            truncated: true,
        }
    }
}

fn table(entries: &[(&str, Ipv4Addr)]) -> HashMap<String, Ipv4Addr> {
    entries
        .iter()
        .map(|(name, addr)| (name.to_lowercase(), *addr))
        .collect()
}

/// Upstream nameserver on loopback that records every query it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub transport: Transport,
    hits: Arc<AtomicUsize>,
    questions: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockUpstream {
    pub async fn start(transport: Transport, behavior: Behavior) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let questions = Arc::new(Mutex::new(Vec::new()));

        let addr = match transport {
            Transport::Udp => {
                let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
                let addr = socket.local_addr().unwrap();
                tokio::spawn(serve_udp(
                    socket,
                    behavior,
                    hits.clone(),
                    questions.clone(),
                ));
                addr
            }
            Transport::Tcp => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                tokio::spawn(serve_tcp(
                    listener,
                    behavior,
                    hits.clone(),
                    questions.clone(),
                ));
                addr
            }
        };

        Self {
            addr,
            transport,
            hits,
            questions,
        }
    }

    pub fn nameserver(&self, timeout: Duration) -> Nameserver {
        Nameserver::new(self.addr.to_string(), timeout, self.transport)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Question names of every query received, in arrival order.
    pub fn questions(&self) -> Vec<Vec<String>> {
        self.questions.lock().clone()
    }
}

fn mock_reply(
    query: &[u8],
    behavior: &Behavior,
    hits: &AtomicUsize,
    questions: &Mutex<Vec<Vec<String>>>,
) -> Option<Vec<u8>> {
    let request = DNSPacket::parse(query).ok()?;
    hits.fetch_add(1, Ordering::SeqCst);
    questions
        .lock()
        .push(request.questions.iter().map(DNSQuestion::name).collect());

    let mut reply = DNSPacket::reply_to(&request);
    reply.header.ra = true;

    let (table, extra, truncated) = match behavior {
        Behavior::Silent => return None,
        Behavior::Flood(count) => {
            for question in &request.questions {
                for i in 0..*count {
                    let addr = Ipv4Addr::new(10, 200, (i / 256) as u8, (i % 256) as u8);
                    reply.answers.push(DNSResource::a(&question.name(), 60, addr));
                }
            }
            return reply.serialize().ok();
        }
        Behavior::Answer(table) => (table, &[][..], false),
        Behavior::Decorated {
            table,
            extra,
            truncated,
        } => (table, extra.as_slice(), *truncated),
    };

    for question in &request.questions {
        let name = question.name();
        if let Some(addr) = table.get(&name.to_lowercase()) {
            reply.answers.push(DNSResource::a(&name, 60, *addr));
        }
    }
    for (name, addr) in extra {
        reply.answers.push(DNSResource::a(name, 60, *addr));
    }
    reply.header.tc = truncated;
    reply.serialize().ok()
}

async fn serve_udp(
    socket: UdpSocket,
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
    questions: Arc<Mutex<Vec<Vec<String>>>>,
) {
    let mut buf = vec![0u8; 4096];
    loop {
        let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
            return;
        };
        if let Some(reply) = mock_reply(&buf[..len], &behavior, &hits, &questions) {
            let _ = socket.send_to(&reply, peer).await;
        }
    }
}

async fn serve_tcp(
    listener: TcpListener,
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
    questions: Arc<Mutex<Vec<Vec<String>>>>,
) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let behavior = behavior.clone();
        let hits = hits.clone();
        let questions = questions.clone();
        tokio::spawn(async move {
            loop {
                let Ok(query) = read_framed(&mut stream).await else {
                    return;
                };
                match mock_reply(&query, &behavior, &hits, &questions) {
                    Some(reply) => {
                        if write_framed(&mut stream, &reply).await.is_err() {
                            return;
                        }
                    }
                    // hold the connection open without answering
                    None => tokio::time::sleep(Duration::from_secs(60)).await,
                }
            }
        });
    }
}

/// Address on loopback where nothing listens.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A server running on loopback with its listener pool spawned.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<RecordStore>,
}

pub async fn start_server(records: &[(&str, Ipv4Addr, u32)], nameservers: Vec<Nameserver>) -> TestServer {
    let store = Arc::new(RecordStore::new());
    for (name, address, ttl) in records {
        store.set(
            name,
            Record {
                address: *address,
                ttl: *ttl,
            },
        );
    }
    start_server_with_store(store, nameservers).await
}

/// Runs a server over an existing store, e.g. one shared with the admin API.
pub async fn start_server_with_store(store: Arc<RecordStore>, nameservers: Vec<Nameserver>) -> TestServer {
    let recursor = Arc::new(Recursor::new(nameservers));
    let authority = Arc::new(Authority::new(ZONE, HOST, store.clone(), recursor.clone()));
    let handler = Arc::new(QueryHandler::new(authority, recursor));

    let pool = ListenerPool::bind("127.0.0.1:0".parse().unwrap(), handler)
        .await
        .unwrap();
    let addr = pool.local_addr().unwrap();
    tokio::spawn(pool.run());

    TestServer { addr, store }
}

pub fn query(id: u16, names: &[&str]) -> DNSPacket {
    let mut packet = DNSPacket::default();
    packet.header.id = id;
    packet.header.rd = true;
    packet.questions = names
        .iter()
        .map(|name| DNSQuestion::new(name, DNSResourceType::A))
        .collect();
    packet
}

/// Advertises an EDNS payload size via an OPT pseudo-record.
pub fn with_payload_size(mut packet: DNSPacket, size: u16) -> DNSPacket {
    packet.resources.push(DNSResource {
        labels: vec![String::new()],
        rtype: DNSResourceType::OPT,
        rclass: DNSResourceClass::from(size),
        ttl: 0,
        rdata: DNSResourceData::Raw(Vec::new()),
    });
    packet
}

pub async fn udp_exchange(server: SocketAddr, request: &DNSPacket) -> DNSPacket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&request.serialize().unwrap(), server)
        .await
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(CLIENT_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .expect("no UDP reply from server")
        .unwrap();
    DNSPacket::parse(&buf[..len]).unwrap()
}

pub async fn tcp_exchange(stream: &mut TcpStream, request: &DNSPacket) -> DNSPacket {
    write_framed(stream, &request.serialize().unwrap())
        .await
        .unwrap();
    let reply = timeout(CLIENT_TIMEOUT, read_framed(stream))
        .await
        .expect("no TCP reply from server")
        .unwrap();
    DNSPacket::parse(&reply).unwrap()
}

pub async fn read_framed(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut length = [0u8; 2];
    stream.read_exact(&mut length).await?;
    let mut message = vec![0u8; u16::from_be_bytes(length) as usize];
    stream.read_exact(&mut message).await?;
    Ok(message)
}

pub async fn write_framed(stream: &mut TcpStream, message: &[u8]) -> std::io::Result<()> {
    stream
        .write_all(&(message.len() as u16).to_be_bytes())
        .await?;
    stream.write_all(message).await?;
    stream.flush().await
}

/// Answers rendered as zone-file lines for easy comparison.
pub fn lines(records: &[DNSResource]) -> Vec<String> {
    records.iter().map(|record| record.to_string()).collect()
}
