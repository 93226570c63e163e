use crate::packet::MAX_PAYLOAD_SIZE;
use std::time::Duration;

const DEFAULT_RETRANSMIT_INTERVAL: u64 = 50; // ms
const DEFAULT_HANDSHAKE_TIMEOUT: u64 = 500; // ms

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bytes of application payload per DATA packet.
    segment_size: usize,

    /// How long the sender sleeps between retransmissions of the
    /// oldest unacknowledged segment (and between FIN retransmissions).
    retransmit_interval: Duration,

    /// How long the client waits for a SYNACK before failing one
    /// handshake attempt. Fixed, not configurable.
    handshake_timeout: Duration,

    /// Bound on full-handshake attempts before `transfer` gives up.
    /// `None` retries forever.
    max_handshake_attempts: Option<u32>,

    /// Bound on FIN retransmissions before termination gives up.
    /// `None` retries forever.
    max_fin_retransmits: Option<u32>,
}

impl TransportConfig {
    pub fn default() -> Self {
        Self {
            segment_size: MAX_PAYLOAD_SIZE,
            retransmit_interval: Duration::from_millis(DEFAULT_RETRANSMIT_INTERVAL),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT),
            max_handshake_attempts: None,
            max_fin_retransmits: None,
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn with_segment_size(mut self, value: usize) -> Self {
        assert!(value > 0 && value <= MAX_PAYLOAD_SIZE);
        self.segment_size = value;

        self
    }

    pub fn retransmit_interval(&self) -> Duration {
        self.retransmit_interval
    }

    pub fn with_retransmit_interval(mut self, value: Duration) -> Self {
        self.retransmit_interval = value;

        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn max_handshake_attempts(&self) -> Option<u32> {
        self.max_handshake_attempts
    }

    pub fn with_max_handshake_attempts(mut self, value: u32) -> Self {
        self.max_handshake_attempts = Some(value);

        self
    }

    pub fn max_fin_retransmits(&self) -> Option<u32> {
        self.max_fin_retransmits
    }

    pub fn with_max_fin_retransmits(mut self, value: u32) -> Self {
        self.max_fin_retransmits = Some(value);

        self
    }
}
