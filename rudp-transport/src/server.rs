use crate::config::TransportConfig;
use crate::conn::ConnectionVars;
use crate::delivery::{deliver, terminate};
use crate::dispatcher::{handle_server_packet, ServerAction};
use crate::outbound::Outbound;
use crate::packet::{Packet, MAX_DATAGRAM_SIZE};
use crate::segment::segment;
use anyhow::{Context, Error, Result};
use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Invoked with the complete request payload once a peer has finished
/// sending. The handler replies by calling `connection.transfer` with
/// the response payload.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Vec<u8>, connection: ServerConnection);
}

/// The passive-open side of the transport. A single socket serves all
/// peers, demultiplexed by the peer identity carried inside each packet.
pub struct Server {
    port: u16,
    config: TransportConfig,
}

/// Handle to one peer's connection state, used to send the response
/// after the handler has produced it.
#[derive(Clone)]
pub struct ServerConnection {
    con: Arc<Mutex<ConnectionVars>>,
    outbound: Outbound,
    config: TransportConfig,
}

impl Server {
    pub fn new(port: u16, config: TransportConfig) -> Self {
        Self { port, config }
    }

    pub async fn run(&self, handler: Arc<dyn RequestHandler>) -> Result<()> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], self.port)))
            .await
            .with_context(|| format!("failed to bind UDP socket on port {}", self.port))?;

        info!("listening on {}", socket.local_addr()?);

        let (mut recv_half, send_half) = socket.split();
        let outbound = Outbound::spawn(send_half);

        let mut connections: HashMap<SocketAddrV4, Arc<Mutex<ConnectionVars>>> = HashMap::new();

        let mut buff = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (read, source) = recv_half
                .recv_from(&mut buff)
                .await
                .context("failed to receive packet")?;

            let packet = match Packet::parse(&buff[..read]) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("discarding malformed packet from {}: {}", source, err);
                    continue;
                }
            };

            let peer = packet.peer();

            let con = connections.entry(peer).or_insert_with(|| {
                debug!("new connection for peer {}", peer);
                Arc::new(Mutex::new(ConnectionVars::new()))
            });

            match handle_server_packet(packet, source, con, &outbound) {
                ServerAction::SpawnHandler => {
                    let connection = ServerConnection {
                        con: Arc::clone(con),
                        outbound: outbound.clone(),
                        config: self.config.clone(),
                    };
                    let handler = Arc::clone(&handler);

                    tokio::spawn(async move {
                        let request = connection.request();

                        debug!("handling {} byte request from {}", request.len(), peer);
                        handler.handle(request, connection).await;
                    });
                }
                ServerAction::None => {}
            }

            // Completed entries are kept for one linger window so late
            // FIN retransmissions still find their connection, then
            // dropped so the table does not grow with every client.
            sweep_connections(&mut connections, self.config.handshake_timeout());
        }
    }
}

fn sweep_connections(
    connections: &mut HashMap<SocketAddrV4, Arc<Mutex<ConnectionVars>>>,
    linger: Duration,
) {
    connections.retain(|peer, con| {
        let expired = con.lock().unwrap().expired(linger);

        if expired {
            debug!("evicting completed connection for {}", peer);
        }

        !expired
    });
}

impl ServerConnection {
    pub fn request(&self) -> Vec<u8> {
        self.con.lock().unwrap().reassembled()
    }

    /// Delivers the response payload and terminates our direction of the
    /// connection.
    pub async fn transfer(&self, response: &[u8]) -> Result<()> {
        let (peer, reply_to) = {
            let con = self.con.lock().unwrap();
            (con.peer(), con.reply_to())
        };

        let peer = peer.ok_or_else(|| Error::msg("connection peer is not known"))?;
        let reply_to = reply_to.ok_or_else(|| Error::msg("connection reply address is not known"))?;

        let segments = segment(response, self.config.segment_size());
        deliver(&segments, &self.con, &self.outbound, reply_to, peer, &self.config).await;
        terminate(&self.con, &self.outbound, reply_to, peer, &self.config).await?;

        info!(
            "response of {} byte(s) delivered to {}",
            response.len(),
            peer
        );

        Ok(())
    }
}
