use crate::config::Transport;
use crate::dns::constants::MAX_UDP_MESSAGE;
use crate::error::{DnsError, Result};
use crate::handler::QueryHandler;
use futures::future::select_all;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The UDP and TCP listeners, bound to the same address.
pub struct ListenerPool {
    udp: Arc<UdpSocket>,
    tcp: TcpListener,
    handler: Arc<QueryHandler>,
}

impl ListenerPool {
    /// Binds both transports. With port 0 the UDP port picked by the OS is
    /// reused for TCP.
    pub async fn bind(addr: SocketAddr, handler: Arc<QueryHandler>) -> Result<Self> {
        let udp = UdpSocket::bind(addr)
            .await
            .map_err(|e| DnsError::Io(format!("failed to bind UDP {}: {}", addr, e)))?;
        let udp_addr = udp.local_addr()?;
        let tcp = TcpListener::bind(udp_addr)
            .await
            .map_err(|e| DnsError::Io(format!("failed to bind TCP {}: {}", udp_addr, e)))?;

        Ok(Self {
            udp: Arc::new(udp),
            tcp,
            handler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.udp.local_addr()?)
    }

    /// Runs both listeners until one of them stops. Listeners are expected to
    /// run forever, so returning at all is an error.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!("DNS on {}", addr);

        let handles: Vec<(&'static str, JoinHandle<Result<()>>)> = vec![
            (
                "UDP",
                tokio::spawn(run_udp_server(self.udp, self.handler.clone())),
            ),
            (
                "TCP",
                tokio::spawn(run_tcp_server(self.tcp, self.handler)),
            ),
        ];
        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();

        let (result, index, remaining) = select_all(handles).await;
        for handle in remaining {
            handle.abort();
        }

        let name = names[index];
        match result {
            Ok(Ok(())) => {
                error!("{} DNS server crashed", name);
                Err(DnsError::ListenerStopped(name))
            }
            Ok(Err(e)) => {
                error!("{} DNS server failed: {}", name, e);
                Err(e)
            }
            Err(e) => {
                error!("{} DNS server task aborted: {}", name, e);
                Err(DnsError::ListenerStopped(name))
            }
        }
    }
}

/// Errors on a single receive or accept that do not affect the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Serve DNS over UDP; each datagram is handled in its own task.
pub async fn run_udp_server(sock: Arc<UdpSocket>, handler: Arc<QueryHandler>) -> Result<()> {
    let mut buf = vec![0u8; MAX_UDP_MESSAGE];

    loop {
        let (read_bytes, src_addr) = match sock.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                debug!("Transient UDP receive error: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let query_data = buf[..read_bytes].to_vec();
        let sock = sock.clone();
        let handler = handler.clone();

        tokio::spawn(async move {
            if let Some(response) = handler.handle(&query_data, Transport::Udp, src_addr).await {
                if let Err(e) = sock.send_to(&response, src_addr).await {
                    error!("Failed to send UDP response to {}: {}", src_addr, e);
                }
            }
        });
    }
}

/// Serve DNS over TCP; each connection is handled in its own task.
pub async fn run_tcp_server(listener: TcpListener, handler: Arc<QueryHandler>) -> Result<()> {
    loop {
        let (stream, src_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) if is_transient(&e) => {
                debug!("Transient TCP accept error: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_tcp_connection(stream, src_addr, handler).await {
                warn!("TCP connection error from {}: {}", src_addr, e);
            }
        });
    }
}

/// Reads length-prefixed queries until the client closes the connection.
async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: SocketAddr,
    handler: Arc<QueryHandler>,
) -> Result<()> {
    let mut length_buf = [0u8; 2];

    loop {
        match stream.read_exact(&mut length_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("TCP connection closed by client {}", src_addr);
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let message_length = u16::from_be_bytes(length_buf) as usize;
        let mut message_buf = vec![0u8; message_length];
        stream.read_exact(&mut message_buf).await?;

        let Some(response_data) = handler.handle(&message_buf, Transport::Tcp, src_addr).await
        else {
            debug!("Dropping unanswerable TCP message from {}, closing", src_addr);
            break;
        };

        let response_length = u16::try_from(response_data.len())
            .map_err(|_| DnsError::MessageTooLarge(response_data.len()))?;
        stream.write_all(&response_length.to_be_bytes()).await?;
        stream.write_all(&response_data).await?;
        stream.flush().await?;
    }

    Ok(())
}
