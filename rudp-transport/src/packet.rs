use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// Every packet must fit within a single UDP datagram sent through the relay.
pub const MAX_DATAGRAM_SIZE: usize = 1024;
pub const PACKET_HEADER_SIZE: usize = 1 + 4 + 4 + 2;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - PACKET_HEADER_SIZE;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PacketType {
    Data,
    Syn,
    SynAck,
    Ack,
    Fin,
    FinAck,
}

impl PacketType {
    fn type_id(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Syn => 1,
            Self::SynAck => 2,
            Self::Ack => 3,
            Self::Fin => 4,
            Self::FinAck => 5,
        }
    }

    fn from_type_id(type_id: u8) -> Option<Self> {
        let packet_type = match type_id {
            0 => Self::Data,
            1 => Self::Syn,
            2 => Self::SynAck,
            3 => Self::Ack,
            4 => Self::Fin,
            5 => Self::FinAck,
            _ => return None,
        };

        Some(packet_type)
    }
}

/// The wire unit exchanged between the two endpoints.
///
/// The peer address and port describe the logical remote endpoint and ride
/// inside the packet itself, since datagrams travel via the relay rather
/// than directly between the peers.
#[derive(Debug, PartialEq, Clone)]
pub struct Packet {
    pub packet_type: PacketType,

    /// Segment index for DATA, cumulative-ack count for ACK/FINACK,
    /// current send-base echo for FIN, zero for SYN/SYNACK.
    pub sequence_number: u32,

    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,

    /// Non-empty only for DATA packets.
    pub payload: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum PacketParseError {
    #[error("received packet is too small: {0}")]
    BufferTooSmall(usize),
    #[error("received packet exceeds the datagram capacity: {0}")]
    BufferTooLarge(usize),
    #[error("unknown packet type id: {0}")]
    UnknownPacketType(u8),
}

impl Packet {
    pub fn parse(data: &[u8]) -> Result<Packet, PacketParseError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(PacketParseError::BufferTooSmall(data.len()));
        }

        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(PacketParseError::BufferTooLarge(data.len()));
        }

        let mut cursor = Cursor::new(data);

        let type_id = cursor.read_u8().unwrap();
        let packet_type = PacketType::from_type_id(type_id)
            .ok_or(PacketParseError::UnknownPacketType(type_id))?;
        let sequence_number = cursor.read_u32::<BigEndian>().unwrap();
        let peer_addr = Ipv4Addr::from(cursor.read_u32::<BigEndian>().unwrap());
        let peer_port = cursor.read_u16::<BigEndian>().unwrap();

        let payload = data[PACKET_HEADER_SIZE..].to_vec();

        Ok(Packet {
            packet_type,
            sequence_number,
            peer_addr,
            peer_port,
            payload,
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        use std::io::Write;

        let buff = Vec::with_capacity(PACKET_HEADER_SIZE + self.payload.len());

        let mut cursor = Cursor::new(buff);
        cursor.write_u8(self.packet_type.type_id()).unwrap();
        cursor.write_u32::<BigEndian>(self.sequence_number).unwrap();
        cursor
            .write_u32::<BigEndian>(u32::from(self.peer_addr))
            .unwrap();
        cursor.write_u16::<BigEndian>(self.peer_port).unwrap();
        cursor.write_all(self.payload.as_slice()).unwrap();

        cursor.into_inner()
    }

    pub fn len(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    pub fn peer(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.peer_addr, self.peer_port)
    }

    fn control(packet_type: PacketType, sequence_number: u32, peer: SocketAddrV4) -> Packet {
        Packet {
            packet_type,
            sequence_number,
            peer_addr: *peer.ip(),
            peer_port: peer.port(),
            payload: vec![],
        }
    }

    pub fn data(sequence_number: u32, peer: SocketAddrV4, payload: Vec<u8>) -> Packet {
        assert!(payload.len() <= MAX_PAYLOAD_SIZE);

        Packet {
            packet_type: PacketType::Data,
            sequence_number,
            peer_addr: *peer.ip(),
            peer_port: peer.port(),
            payload,
        }
    }

    pub fn syn(peer: SocketAddrV4) -> Packet {
        Self::control(PacketType::Syn, 0, peer)
    }

    pub fn syn_ack(peer: SocketAddrV4) -> Packet {
        Self::control(PacketType::SynAck, 0, peer)
    }

    pub fn ack(ack_number: u32, peer: SocketAddrV4) -> Packet {
        Self::control(PacketType::Ack, ack_number, peer)
    }

    pub fn fin(send_base: u32, peer: SocketAddrV4) -> Packet {
        Self::control(PacketType::Fin, send_base, peer)
    }

    pub fn fin_ack(ack_number: u32, peer: SocketAddrV4) -> Packet {
        Self::control(PacketType::FinAck, ack_number, peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packet() {
        let raw_data = [0u8, 0, 0, 0, 7, 127, 0, 0, 1, 0x1f, 0x47, 1, 2, 3];

        let packet = Packet::parse(&raw_data).unwrap();

        assert_eq!(packet.packet_type, PacketType::Data);
        assert_eq!(packet.sequence_number, 7);
        assert_eq!(packet.peer_addr, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(packet.peer_port, 8007);
        assert_eq!(packet.payload, vec![1, 2, 3]);
        assert_eq!(packet.len(), 14);
    }

    #[test]
    fn test_parse_packet_too_short() {
        let raw_data = [1, 2, 3, 4];

        match Packet::parse(&raw_data) {
            Err(PacketParseError::BufferTooSmall(4)) => {}
            Err(err) => panic!("incorrect error type: {:?}", err),
            Ok(_) => panic!("must not return Ok"),
        }
    }

    #[test]
    fn test_parse_packet_unknown_type() {
        let raw_data = [9u8, 0, 0, 0, 0, 127, 0, 0, 1, 0, 80];

        match Packet::parse(&raw_data) {
            Err(PacketParseError::UnknownPacketType(9)) => {}
            Err(err) => panic!("incorrect error type: {:?}", err),
            Ok(_) => panic!("must not return Ok"),
        }
    }

    #[test]
    fn test_parse_packet_too_large() {
        let raw_data = [0u8; MAX_DATAGRAM_SIZE + 1];

        match Packet::parse(&raw_data) {
            Err(PacketParseError::BufferTooLarge(_)) => {}
            Err(err) => panic!("incorrect error type: {:?}", err),
            Ok(_) => panic!("must not return Ok"),
        }
    }

    #[test]
    fn test_packet_to_vec() {
        let packet = Packet::data(
            1,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 8007),
            vec![4, 5, 6],
        );

        let result = packet.to_vec();

        assert_eq!(
            result,
            vec![0, 0, 0, 0, 1, 192, 168, 0, 1, 0x1f, 0x47, 4, 5, 6]
        );
    }

    #[test]
    fn test_packet_to_vec_then_parse() {
        let packet = Packet::data(
            42,
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 3000),
            vec![1, 2, 3, 54, 5, 6, 54, 65, 6, 5, 7, 65, 76, 87, 86, 7, 8],
        );

        let parsed_packet = Packet::parse(packet.to_vec().as_slice()).unwrap();

        assert_eq!(parsed_packet, packet);
    }

    #[test]
    fn test_control_packets_have_empty_payloads() {
        let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8007);

        assert_eq!(Packet::syn(peer).payload, Vec::<u8>::new());
        assert_eq!(Packet::syn_ack(peer).payload, Vec::<u8>::new());
        assert_eq!(Packet::ack(3, peer).payload, Vec::<u8>::new());
        assert_eq!(Packet::fin(2, peer).payload, Vec::<u8>::new());
        assert_eq!(Packet::fin_ack(4, peer).payload, Vec::<u8>::new());

        assert_eq!(Packet::syn(peer).sequence_number, 0);
        assert_eq!(Packet::ack(3, peer).sequence_number, 3);
        assert_eq!(Packet::fin(2, peer).sequence_number, 2);
    }
}
