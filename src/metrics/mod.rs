pub mod logger;

use crate::scheduler::SimTime;
use serde::{Deserialize, Serialize};

/// Counters for one run. The simulation is single-threaded so these are
/// plain fields, bumped through the dispatch context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimMetrics {
    pub events_dispatched: u64,
    pub messages_submitted: u64,
    pub messages_acknowledged: u64,
    pub messages_delivered: u64,
    pub segments_sent: u64,
    pub retransmissions: u64,
    pub segments_lost: u64,
    pub segments_discarded: u64,
    pub acks_sent: u64,
    pub duplicate_acks: u64,
    pub stale_timeouts: u64,
    pub bytes_delivered: u64,
    pub final_time: SimTime,
}

impl SimMetrics {
    /// Every transmission attempt on the data path, first sends included.
    pub fn transmissions(&self) -> u64 {
        self.segments_sent + self.retransmissions
    }

    pub fn loss_rate(&self) -> f64 {
        let attempts = self.transmissions();
        if attempts > 0 {
            self.segments_lost as f64 / attempts as f64
        } else {
            0.0
        }
    }

    /// Payload bytes per unit of simulated time.
    pub fn goodput(&self) -> f64 {
        if self.final_time > 0 {
            self.bytes_delivered as f64 / self.final_time as f64
        } else {
            0.0
        }
    }
}
