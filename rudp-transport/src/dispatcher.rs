use crate::config::TransportConfig;
use crate::conn::ConnectionVars;
use crate::outbound::Outbound;
use crate::packet::{Packet, PacketType, MAX_DATAGRAM_SIZE};
use log::*;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::udp::RecvHalf;
use tokio::task::JoinHandle;
use tokio::time::delay_for;

/// What the server loop must do after a packet has been absorbed into
/// the connection state.
#[derive(Debug, PartialEq)]
pub(crate) enum ServerAction {
    None,

    /// A first FIN arrived, so the inbound payload is complete and the
    /// request handler should be invoked for this connection.
    SpawnHandler,
}

/// Spawns the client-side reception task. It owns the receive half of
/// the socket and folds every inbound packet into the shared connection
/// state until the exchange is complete in both directions, then lingers
/// briefly to answer retransmitted FINs before exiting.
pub(crate) fn spawn_client_dispatcher(
    mut recv_half: RecvHalf,
    con: Arc<Mutex<ConnectionVars>>,
    outbound: Outbound,
    config: TransportConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buff = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let complete = con.lock().unwrap().is_complete();

            let result = if complete {
                tokio::select! {
                    result = recv_half.recv_from(&mut buff) => result,
                    _ = delay_for(config.handshake_timeout()) => break,
                }
            } else {
                recv_half.recv_from(&mut buff).await
            };

            let (read, source) = match result {
                Ok(received) => received,
                Err(err) => {
                    error!("failed to receive packet: {}", err);
                    break;
                }
            };

            let packet = match Packet::parse(&buff[..read]) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("discarding malformed packet from {}: {}", source, err);
                    continue;
                }
            };

            handle_client_packet(packet, source, &con, &outbound);
        }

        debug!("client dispatcher exited");
    })
}

pub(crate) fn handle_client_packet(
    packet: Packet,
    source: SocketAddr,
    con: &Arc<Mutex<ConnectionVars>>,
    outbound: &Outbound,
) {
    let peer = packet.peer();

    debug!(
        "received {:?} packet (seq {}) for {} from {}",
        packet.packet_type, packet.sequence_number, peer, source
    );

    match packet.packet_type {
        PacketType::Data => {
            let ack_number = {
                let mut con = con.lock().unwrap();
                con.store_segment(packet.sequence_number, packet.payload)
            };

            outbound.send(Packet::ack(ack_number, peer), source);
        }
        PacketType::Ack => {
            con.lock().unwrap().update_send_base(packet.sequence_number);
        }
        PacketType::Fin => {
            let ack_number = {
                let mut con = con.lock().unwrap();
                con.set_peer_terminated();
                con.ack_number()
            };

            // Answered unconditionally so retransmitted FINs are acked too
            outbound.send(Packet::fin_ack(ack_number, peer), source);
        }
        PacketType::FinAck => {
            con.lock().unwrap().set_fin_ack_received();
        }
        PacketType::Syn | PacketType::SynAck => {
            debug!("ignoring stray {:?} packet", packet.packet_type);
        }
    }
}

pub(crate) fn handle_server_packet(
    packet: Packet,
    source: SocketAddr,
    con: &Arc<Mutex<ConnectionVars>>,
    outbound: &Outbound,
) -> ServerAction {
    let peer = packet.peer();

    debug!(
        "received {:?} packet (seq {}) for {} from {}",
        packet.packet_type, packet.sequence_number, peer, source
    );

    match packet.packet_type {
        PacketType::Syn => {
            // A SYN begins a fresh exchange, including on a connection
            // reused after a completed one.
            let mut con = con.lock().unwrap();
            con.reset();
            con.set_peer(peer);
            con.set_reply_to(source);

            outbound.send(Packet::syn_ack(peer), source);
        }
        PacketType::SynAck => {
            // The client's handshake confirmation carries no state
        }
        PacketType::Data => {
            let ack_number = {
                let mut con = con.lock().unwrap();
                con.set_reply_to(source);
                con.store_segment(packet.sequence_number, packet.payload)
            };

            outbound.send(Packet::ack(ack_number, peer), source);
        }
        PacketType::Fin => {
            let (first, ack_number) = {
                let mut con = con.lock().unwrap();
                con.set_reply_to(source);
                (con.set_peer_terminated(), con.ack_number())
            };

            outbound.send(Packet::fin_ack(ack_number, peer), source);

            if first {
                return ServerAction::SpawnHandler;
            }
        }
        PacketType::Ack => {
            con.lock().unwrap().update_send_base(packet.sequence_number);
        }
        PacketType::FinAck => {
            con.lock().unwrap().set_fin_ack_received();
        }
    }

    ServerAction::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tokio::net::UdpSocket;
    use tokio::runtime::Runtime;

    async fn init_dispatch_fixture() -> (Outbound, UdpSocket, SocketAddr) {
        let socket1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket2 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let source = socket2.local_addr().unwrap();

        let (_, send_half) = socket1.split();

        (Outbound::spawn(send_half), socket2, source)
    }

    async fn recv_packet(socket: &mut UdpSocket) -> Packet {
        let mut buff = [0u8; 1024];
        let read = socket.recv(&mut buff).await.unwrap();

        Packet::parse(&buff[..read]).unwrap()
    }

    #[test]
    fn test_client_data_packet_is_stored_and_acked() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, source) = init_dispatch_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8012);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));

            handle_client_packet(
                Packet::data(0, peer, b"hel".to_vec()),
                source,
                &con,
                &outbound,
            );

            let ack = recv_packet(&mut socket2).await;
            assert_eq!(ack.packet_type, PacketType::Ack);
            assert_eq!(ack.sequence_number, 1);

            assert_eq!(con.lock().unwrap().reassembled(), b"hel".to_vec());
        });
    }

    #[test]
    fn test_client_out_of_order_data_acks_contiguous_prefix() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, source) = init_dispatch_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8013);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));

            handle_client_packet(Packet::data(1, peer, b"lo".to_vec()), source, &con, &outbound);

            let ack = recv_packet(&mut socket2).await;
            assert_eq!(ack.sequence_number, 0);

            handle_client_packet(Packet::data(0, peer, b"hel".to_vec()), source, &con, &outbound);

            let ack = recv_packet(&mut socket2).await;
            assert_eq!(ack.sequence_number, 2);
        });
    }

    #[test]
    fn test_server_duplicate_fin_spawns_handler_once_but_acks_both() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, source) = init_dispatch_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8014);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));

            let first =
                handle_server_packet(Packet::fin(0, peer), source, &con, &outbound);
            let second =
                handle_server_packet(Packet::fin(0, peer), source, &con, &outbound);

            assert_eq!(first, ServerAction::SpawnHandler);
            assert_eq!(second, ServerAction::None);

            for _ in 0..2 {
                let packet = recv_packet(&mut socket2).await;
                assert_eq!(packet.packet_type, PacketType::FinAck);
            }
        });
    }

    #[test]
    fn test_server_syn_resets_connection_and_replies_syn_ack() {
        Runtime::new().unwrap().block_on(async {
            let (outbound, mut socket2, source) = init_dispatch_fixture().await;

            let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8015);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));

            // State left over from a completed exchange
            {
                let mut con = con.lock().unwrap();
                con.store_segment(0, b"old".to_vec());
                con.set_peer_terminated();
                con.set_fin_ack_received();
            }

            let action = handle_server_packet(Packet::syn(peer), source, &con, &outbound);
            assert_eq!(action, ServerAction::None);

            let reply = recv_packet(&mut socket2).await;
            assert_eq!(reply.packet_type, PacketType::SynAck);

            let con = con.lock().unwrap();
            assert_eq!(con.ack_number(), 0);
            assert_eq!(con.peer_terminated(), false);
            assert_eq!(con.peer(), Some(peer));
            assert_eq!(con.reply_to(), Some(source));
        });
    }

    #[test]
    fn test_client_dispatcher_exits_after_completion_linger() {
        Runtime::new().unwrap().block_on(async {
            let socket1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let (recv_half, send_half) = socket1.split();

            let outbound = Outbound::spawn(send_half);
            let con = Arc::new(Mutex::new(ConnectionVars::new()));

            {
                let mut con = con.lock().unwrap();
                con.set_peer_terminated();
                con.set_fin_ack_received();
            }

            let task = spawn_client_dispatcher(
                recv_half,
                Arc::clone(&con),
                outbound,
                TransportConfig::default(),
            );

            task.await.unwrap();
        });
    }
}
