use crate::config::TransportConfig;
use crate::conn::{wait_for_peer_termination, ConnectionVars};
use crate::delivery::{deliver, terminate};
use crate::dispatcher::spawn_client_dispatcher;
use crate::handshake::handshake_with_retries;
use crate::outbound::Outbound;
use crate::segment::segment;
use anyhow::{Context, Error, Result};
use log::*;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use tokio::net::{lookup_host, UdpSocket};

/// The active-open side of the transport.
///
/// Each `transfer` call opens a fresh connection through the relay,
/// delivers the request payload reliably, and returns the peer's
/// response payload once both directions have terminated.
pub struct Client {
    config: TransportConfig,
}

impl Client {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub async fn transfer(
        &self,
        relay_addr: &str,
        peer_addr: &str,
        request: &[u8],
    ) -> Result<Vec<u8>> {
        let relay = SocketAddr::V4(resolve_v4(relay_addr).await?);
        let peer = resolve_v4(peer_addr).await?;

        let mut socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind UDP socket")?;

        handshake_with_retries(&mut socket, relay, peer, &self.config).await?;

        let (recv_half, send_half) = socket.split();
        let outbound = Outbound::spawn(send_half);
        let con = Arc::new(Mutex::new(ConnectionVars::new()));

        {
            let mut con = con.lock().unwrap();
            con.set_peer(peer);
            con.set_reply_to(relay);
        }

        // The dispatcher outlives this call by a short linger so late
        // FIN retransmissions from the peer still get answered.
        spawn_client_dispatcher(
            recv_half,
            Arc::clone(&con),
            outbound.clone(),
            self.config.clone(),
        );

        let segments = segment(request, self.config.segment_size());
        deliver(&segments, &con, &outbound, relay, peer, &self.config).await;
        terminate(&con, &outbound, relay, peer, &self.config).await?;

        debug!("request delivered, waiting for response from {}", peer);
        wait_for_peer_termination(&con).await;

        let response = con.lock().unwrap().reassembled();
        info!(
            "transfer with {} complete ({} request / {} response bytes)",
            peer,
            request.len(),
            response.len()
        );

        Ok(response)
    }
}

/// Resolves a `host:port` string to its first IPv4 address. The wire
/// format only carries IPv4 peers, so IPv6 results are skipped.
async fn resolve_v4(addr: &str) -> Result<SocketAddrV4> {
    let addrs = lookup_host(addr)
        .await
        .with_context(|| format!("failed to resolve address: {}", addr))?;

    for addr in addrs {
        if let SocketAddr::V4(addr) = addr {
            return Ok(addr);
        }
    }

    Err(Error::msg(format!("no IPv4 address found for {}", addr)))
}
