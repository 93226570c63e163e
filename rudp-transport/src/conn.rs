use crate::segment::{contiguous_prefix_len, reassemble};
use futures::future::poll_fn;
use log::*;
use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::task::{Poll, Waker};
use std::time::{Duration, Instant};

/// The mutable state shared between a connection's foreground
/// send/terminate loops and its background reception dispatcher.
///
/// All access goes through the surrounding `Arc<Mutex<..>>`; the original
/// design shared these fields between threads with no synchronisation at
/// all, which this layout deliberately hardens away.
#[derive(Debug)]
pub(crate) struct ConnectionVars {
    /// Lowest segment index not yet cumulatively acknowledged by the peer.
    send_base: u32,

    /// Segments received from the peer, keyed by segment index.
    received_segments: BTreeMap<u32, Vec<u8>>,

    /// The peer has sent its first FIN for this transfer.
    peer_terminated: bool,

    /// The peer has acknowledged our FIN.
    fin_ack_received: bool,

    /// When both directions finished terminating. Drives eviction from
    /// the server's connection table after the linger window.
    completed_at: Option<Instant>,

    /// Logical peer identity as carried inside inbound packets.
    peer: Option<SocketAddrV4>,

    /// Source address of the most recent inbound datagram, i.e. where
    /// replies must be sent (the relay, in a routed deployment).
    reply_to: Option<SocketAddr>,

    /// Tasks waiting on a flag transition.
    wakers: Vec<Waker>,
}

impl ConnectionVars {
    pub(crate) fn new() -> Self {
        Self {
            send_base: 0,
            received_segments: BTreeMap::new(),
            peer_terminated: false,
            fin_ack_received: false,
            completed_at: None,
            peer: None,
            reply_to: None,
            wakers: vec![],
        }
    }

    /// Resets the per-transfer state, keeping the learned peer identity.
    pub(crate) fn reset(&mut self) {
        debug!("connection variables reset");
        self.send_base = 0;
        self.received_segments.clear();
        self.peer_terminated = false;
        self.fin_ack_received = false;
        self.completed_at = None;
    }

    pub(crate) fn send_base(&self) -> u32 {
        self.send_base
    }

    /// Advances the send base on a cumulative ack. Stale, duplicate and
    /// out-of-order acks below the current base are ignored, so the base
    /// is monotonically non-decreasing within one transfer.
    pub(crate) fn update_send_base(&mut self, ack_number: u32) {
        if ack_number > self.send_base {
            debug!("send base advanced {} -> {}", self.send_base, ack_number);
            self.send_base = ack_number;
        }
    }

    /// Stores an inbound DATA segment and returns the fresh cumulative-ack
    /// count. Duplicate delivery overwrites with identical content.
    pub(crate) fn store_segment(&mut self, sequence_number: u32, payload: Vec<u8>) -> u32 {
        self.received_segments.insert(sequence_number, payload);

        contiguous_prefix_len(&self.received_segments)
    }

    pub(crate) fn ack_number(&self) -> u32 {
        contiguous_prefix_len(&self.received_segments)
    }

    pub(crate) fn reassembled(&self) -> Vec<u8> {
        reassemble(&self.received_segments)
    }

    /// Marks the peer side as terminated. Returns true only on the first
    /// transition, so retransmitted FINs cannot re-trigger delivery.
    pub(crate) fn set_peer_terminated(&mut self) -> bool {
        let first = !self.peer_terminated;
        self.peer_terminated = true;
        self.mark_completed();
        self.wake_waiters();

        first
    }

    pub(crate) fn peer_terminated(&self) -> bool {
        self.peer_terminated
    }

    pub(crate) fn set_fin_ack_received(&mut self) {
        self.fin_ack_received = true;
        self.mark_completed();
        self.wake_waiters();
    }

    pub(crate) fn fin_ack_received(&self) -> bool {
        self.fin_ack_received
    }

    /// Both directions have signalled termination.
    pub(crate) fn is_complete(&self) -> bool {
        self.peer_terminated && self.fin_ack_received
    }

    /// Complete and past the linger window, so late FIN retransmissions
    /// can no longer be expected.
    pub(crate) fn expired(&self, linger: Duration) -> bool {
        match self.completed_at {
            Some(completed_at) => completed_at.elapsed() >= linger,
            None => false,
        }
    }

    fn mark_completed(&mut self) {
        if self.is_complete() && self.completed_at.is_none() {
            self.completed_at = Some(Instant::now());
        }
    }

    pub(crate) fn set_peer(&mut self, peer: SocketAddrV4) {
        self.peer = Some(peer);
    }

    pub(crate) fn peer(&self) -> Option<SocketAddrV4> {
        self.peer
    }

    pub(crate) fn set_reply_to(&mut self, reply_to: SocketAddr) {
        self.reply_to = Some(reply_to);
    }

    pub(crate) fn reply_to(&self) -> Option<SocketAddr> {
        self.reply_to
    }

    fn wake_waiters(&mut self) {
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
    }
}

/// Resolves once the peer has acknowledged our FIN. Woken on the flag
/// transition rather than polled at a fixed interval.
pub(crate) async fn wait_for_fin_ack(con: &Arc<Mutex<ConnectionVars>>) {
    let con = Arc::clone(con);

    poll_fn(move |cx| {
        let mut con = con.lock().unwrap();

        if con.fin_ack_received {
            Poll::Ready(())
        } else {
            con.wakers.push(cx.waker().clone());
            Poll::Pending
        }
    })
    .await
}

/// Resolves once the peer has sent its first FIN for this transfer.
pub(crate) async fn wait_for_peer_termination(con: &Arc<Mutex<ConnectionVars>>) {
    let con = Arc::clone(con);

    poll_fn(move |cx| {
        let mut con = con.lock().unwrap();

        if con.peer_terminated {
            Poll::Ready(())
        } else {
            con.wakers.push(cx.waker().clone());
            Poll::Pending
        }
    })
    .await
}
