use crate::config::TransportConfig;
use crate::packet::{Packet, PacketType, MAX_DATAGRAM_SIZE};
use anyhow::{Context, Error, Result};
use log::*;
use std::net::{SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::delay_for;

/// One client-side active-open attempt: SYN, wait for SYNACK bounded by
/// the handshake timeout, confirm with a SYNACK of our own.
pub(crate) async fn handshake(
    socket: &mut UdpSocket,
    relay_addr: SocketAddr,
    peer: SocketAddrV4,
    config: &TransportConfig,
) -> Result<()> {
    debug!("sending SYN for {} via {}", peer, relay_addr);
    socket
        .send_to(Packet::syn(peer).to_vec().as_slice(), relay_addr)
        .await
        .context("failed to send SYN packet")?;

    let mut buff = [0u8; MAX_DATAGRAM_SIZE];

    let read = tokio::select! {
        result = socket.recv_from(&mut buff) => match result {
            Ok((read, _)) => read,
            Err(err) => return Err(Error::from(err)).context("failed to wait for SYNACK packet"),
        },
        _ = delay_for(config.handshake_timeout()) => {
            return Err(Error::msg("timed out while waiting for SYNACK"))
        }
    };

    let reply = Packet::parse(&buff[..read])?;

    match reply.packet_type {
        PacketType::SynAck => {}
        other => {
            return Err(Error::msg(format!(
                "expected SYNACK but received {:?} packet",
                other
            )))
        }
    }

    debug!("SYNACK received, confirming handshake");
    socket
        .send_to(Packet::syn_ack(peer).to_vec().as_slice(), relay_addr)
        .await
        .context("failed to send SYNACK reply")?;

    Ok(())
}

/// Retries the full handshake until it succeeds. By default this never
/// gives up; `TransportConfig::with_max_handshake_attempts` bounds it and
/// surfaces a terminal error instead.
pub(crate) async fn handshake_with_retries(
    socket: &mut UdpSocket,
    relay_addr: SocketAddr,
    peer: SocketAddrV4,
    config: &TransportConfig,
) -> Result<()> {
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match handshake(socket, relay_addr, peer, config).await {
            Ok(()) => {
                info!("handshake with {} succeeded after {} attempt(s)", peer, attempts);
                return Ok(());
            }
            Err(err) => warn!("handshake attempt {} failed: {}", attempts, err),
        }

        if let Some(max_attempts) = config.max_handshake_attempts() {
            if attempts >= max_attempts {
                return Err(Error::msg(format!(
                    "handshake with {} failed after {} attempts",
                    peer, attempts
                )));
            }
        }
    }
}
