use crate::config::TransportConfig;
use crate::conn::{wait_for_fin_ack, ConnectionVars};
use crate::outbound::Outbound;
use crate::packet::Packet;
use anyhow::{Error, Result};
use log::*;
use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use tokio::time::delay_for;

/// Sends every segment once, then retransmits only the oldest
/// unacknowledged segment each interval until the whole payload has been
/// cumulatively acknowledged. Acks arrive via the dispatcher advancing
/// the shared send base.
pub(crate) async fn deliver(
    segments: &BTreeMap<u32, Vec<u8>>,
    con: &Arc<Mutex<ConnectionVars>>,
    outbound: &Outbound,
    dest: SocketAddr,
    peer: SocketAddrV4,
    config: &TransportConfig,
) {
    let segment_count = segments.len() as u32;

    debug!("delivering {} segment(s) to {}", segment_count, peer);

    for (sequence_number, payload) in segments.iter() {
        outbound.send(Packet::data(*sequence_number, peer, payload.clone()), dest);
    }

    loop {
        delay_for(config.retransmit_interval()).await;

        let send_base = con.lock().unwrap().send_base();

        if send_base >= segment_count {
            break;
        }

        // Retransmission is strictly base-only: however far the base
        // lags, each interval resends the single oldest outstanding
        // segment and nothing else.
        if let Some(payload) = segments.get(&send_base) {
            debug!("retransmitting segment {} to {}", send_base, peer);
            outbound.send(Packet::data(send_base, peer, payload.clone()), dest);
        }
    }

    debug!("all {} segment(s) acknowledged by {}", segment_count, peer);
}

/// Retransmits FIN carrying the final send base until the peer replies
/// with FINACK, bounded by `max_fin_retransmits` when configured.
pub(crate) async fn terminate(
    con: &Arc<Mutex<ConnectionVars>>,
    outbound: &Outbound,
    dest: SocketAddr,
    peer: SocketAddrV4,
    config: &TransportConfig,
) -> Result<()> {
    let sequence_number = con.lock().unwrap().send_base();
    let mut retransmits = 0u32;

    outbound.send(Packet::fin(sequence_number, peer), dest);

    loop {
        tokio::select! {
            _ = wait_for_fin_ack(con) => break,
            _ = delay_for(config.retransmit_interval()) => {}
        }

        if let Some(max_retransmits) = config.max_fin_retransmits() {
            if retransmits >= max_retransmits {
                return Err(Error::msg(format!(
                    "no FINACK from {} after {} FIN retransmissions",
                    peer, retransmits
                )));
            }
        }

        retransmits += 1;
        debug!("retransmitting FIN to {}", peer);
        outbound.send(Packet::fin(sequence_number, peer), dest);
    }

    debug!("FINACK received from {}", peer);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use crate::segment::segment;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::runtime::Runtime;

    async fn init_delivery_fixture() -> (Outbound, UdpSocket, SocketAddr) {
        let socket1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket2 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = socket2.local_addr().unwrap();

        let (_, send_half) = socket1.split();

        (Outbound::spawn(send_half), socket2, dest)
    }

    async fn recv_packet(socket: &mut UdpSocket) -> Packet {
        let mut buff = [0u8; 1024];
        let read = socket.recv(&mut buff).await.unwrap();

        Packet::parse(&buff[..read]).unwrap()
    }

    #[test]
    fn test_deliver_sends_all_segments_then_completes_on_ack() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, dest) = init_delivery_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8008);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));
            let config = TransportConfig::default();
            let segments = segment(b"hello world", 3);

            let task = {
                let con = Arc::clone(&con);
                let outbound = outbound.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    deliver(&segments, &con, &outbound, dest, peer, &config).await
                })
            };

            for i in 0..4u32 {
                let packet = recv_packet(&mut socket2).await;
                assert_eq!(packet.packet_type, PacketType::Data);
                assert_eq!(packet.sequence_number, i);
            }

            con.lock().unwrap().update_send_base(4);

            task.await.unwrap();
        });
    }

    #[test]
    fn test_deliver_retransmits_base_segment_only() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, dest) = init_delivery_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8009);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));
            let config =
                TransportConfig::default().with_retransmit_interval(Duration::from_millis(10));
            let segments = segment(b"abcdef", 3);

            // Pretend segment 0 was acknowledged but segment 1 was lost
            con.lock().unwrap().update_send_base(1);

            let task = {
                let con = Arc::clone(&con);
                let outbound = outbound.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    deliver(&segments, &con, &outbound, dest, peer, &config).await
                })
            };

            // Initial pass
            assert_eq!(recv_packet(&mut socket2).await.sequence_number, 0);
            assert_eq!(recv_packet(&mut socket2).await.sequence_number, 1);

            // Every retransmission targets the send base
            for _ in 0..3 {
                let packet = recv_packet(&mut socket2).await;
                assert_eq!(packet.packet_type, PacketType::Data);
                assert_eq!(packet.sequence_number, 1);
            }

            con.lock().unwrap().update_send_base(2);

            task.await.unwrap();
        });
    }

    #[test]
    fn test_terminate_completes_on_fin_ack() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, dest) = init_delivery_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8010);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));
            let config = TransportConfig::default();

            let task = {
                let con = Arc::clone(&con);
                let outbound = outbound.clone();
                let config = config.clone();
                tokio::spawn(
                    async move { terminate(&con, &outbound, dest, peer, &config).await },
                )
            };

            let packet = recv_packet(&mut socket2).await;
            assert_eq!(packet.packet_type, PacketType::Fin);
            assert_eq!(packet.sequence_number, 0);

            con.lock().unwrap().set_fin_ack_received();

            task.await.unwrap().unwrap();
        });
    }

    #[test]
    fn test_terminate_gives_up_when_bounded() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, dest) = init_delivery_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8011);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));
            let config = TransportConfig::default()
                .with_retransmit_interval(Duration::from_millis(10))
                .with_max_fin_retransmits(2);

            let result = terminate(&con, &outbound, dest, peer, &config).await;

            assert_eq!(result.is_err(), true);

            // Original FIN plus the two bounded retransmissions
            for _ in 0..3 {
                let packet = recv_packet(&mut socket2).await;
                assert_eq!(packet.packet_type, PacketType::Fin);
            }
        });
    }
}
