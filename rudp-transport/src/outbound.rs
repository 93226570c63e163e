use crate::packet::Packet;
use log::*;
use std::net::SocketAddr;
use tokio::net::udp::SendHalf;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// All socket writes for a role instance are funnelled through a single
/// task owning the send half of the socket. The dispatcher and the
/// send/terminate loops queue packets here instead of racing over the
/// socket themselves.
#[derive(Clone)]
pub(crate) struct Outbound {
    sender: UnboundedSender<(Packet, SocketAddr)>,
}

impl Outbound {
    pub(crate) fn spawn(mut send_half: SendHalf) -> Self {
        let (tx, mut rx) = unbounded_channel::<(Packet, SocketAddr)>();

        tokio::spawn(async move {
            while let Some((packet, dest)) = rx.recv().await {
                debug!("sending {:?} packet to {}", packet.packet_type, dest);

                if let Err(err) = send_half.send_to(packet.to_vec().as_slice(), &dest).await {
                    error!(
                        "failed to send {:?} packet to {}: {}",
                        packet.packet_type, dest, err
                    );
                }
            }

            debug!("outbound queue closed");
        });

        Self { sender: tx }
    }

    pub(crate) fn send(&self, packet: Packet, dest: SocketAddr) {
        if let Err(err) = self.sender.send((packet, dest)) {
            warn!("failed to queue outbound packet: {}", err);
        }
    }
}
