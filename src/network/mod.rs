pub mod checksum;
pub mod segment;

pub use checksum::checksum16;
pub use segment::{CodecError, Segment};

use crate::event::Event;
use crate::scheduler::{EventScheduler, SimTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// Which side a delivered segment is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Sender,
    Receiver,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Sender => write!(f, "sender"),
            Endpoint::Receiver => write!(f, "receiver"),
        }
    }
}

/// Randomness behind the loss model. Swap in [`ScriptedLoss`] to force
/// outcomes in tests.
pub trait LossSource: Send + fmt::Debug {
    /// One Bernoulli trial: `true` means the segment is lost.
    fn lose(&mut self, probability: f64) -> bool;
}

impl LossSource for StdRng {
    fn lose(&mut self, probability: f64) -> bool {
        self.r#gen::<f64>() < probability
    }
}

/// Replays a fixed list of drop decisions, then delivers everything.
/// The probability is ignored.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLoss {
    outcomes: VecDeque<bool>,
}

impl ScriptedLoss {
    pub fn new(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }

    pub fn never() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> usize {
        self.outcomes.len()
    }
}

impl LossSource for ScriptedLoss {
    fn lose(&mut self, _probability: f64) -> bool {
        self.outcomes.pop_front().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub transmission_delay: SimTime,
    pub loss_probability: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transmission_delay: 5,
            loss_probability: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Arrives(SimTime),
    Lost,
}

/// Fixed-delay link with independent per-attempt loss.
#[derive(Debug)]
pub struct NetworkLink {
    config: NetworkConfig,
    loss: Box<dyn LossSource>,
}

impl NetworkLink {
    pub fn new(config: NetworkConfig, loss: Box<dyn LossSource>) -> Self {
        Self { config, loss }
    }

    pub fn seeded(config: NetworkConfig, seed: u64) -> Self {
        Self::new(config, Box::new(StdRng::seed_from_u64(seed)))
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn delay(&self) -> SimTime {
        self.config.transmission_delay
    }

    /// Draw once; on survival schedule a `ReceivePacket` for `to` after the
    /// link delay. A loss schedules nothing and is not an error.
    pub fn attempt_deliver(
        &mut self,
        scheduler: &mut EventScheduler<Event>,
        segment: Segment,
        origin: SimTime,
        to: Endpoint,
    ) -> Delivery {
        if self.loss.lose(self.config.loss_probability) {
            debug!("Link dropped {} towards {}", segment, to);
            return Delivery::Lost;
        }
        Delivery::Arrives(self.deliver(scheduler, segment, origin, to))
    }

    /// Same delay, no loss draw. Receiver replies go this way.
    pub fn deliver(
        &mut self,
        scheduler: &mut EventScheduler<Event>,
        segment: Segment,
        origin: SimTime,
        to: Endpoint,
    ) -> SimTime {
        let at = origin.saturating_add(self.config.transmission_delay);
        scheduler.schedule(Event::ReceivePacket { to, segment }, at);
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(outcomes: Vec<bool>) -> NetworkLink {
        NetworkLink::new(NetworkConfig::default(), Box::new(ScriptedLoss::new(outcomes)))
    }

    #[test]
    fn delivery_lands_after_fixed_delay() {
        let mut scheduler = EventScheduler::new();
        let mut link = link(vec![false]);
        let seg = Segment::data(0, 0, b"ab".to_vec(), true, 0);

        let outcome = link.attempt_deliver(&mut scheduler, seg.clone(), 12, Endpoint::Receiver);
        assert_eq!(outcome, Delivery::Arrives(17));

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.time, 17);
        match entry.payload {
            Event::ReceivePacket { to, segment } => {
                assert_eq!(to, Endpoint::Receiver);
                assert_eq!(segment, seg);
            }
            other => panic!("unexpected event {other}"),
        }
    }

    #[test]
    fn loss_schedules_nothing() {
        let mut scheduler = EventScheduler::new();
        let mut link = link(vec![true, false]);
        let seg = Segment::data(0, 0, b"ab".to_vec(), false, 0);

        assert_eq!(
            link.attempt_deliver(&mut scheduler, seg.clone(), 0, Endpoint::Receiver),
            Delivery::Lost
        );
        assert!(scheduler.is_empty());

        assert_eq!(
            link.attempt_deliver(&mut scheduler, seg, 0, Endpoint::Receiver),
            Delivery::Arrives(5)
        );
        assert_eq!(scheduler.size(), 1);
    }

    #[test]
    fn replies_skip_the_loss_draw() {
        let mut scheduler = EventScheduler::new();
        let mut link = link(vec![true]);

        let at = link.deliver(&mut scheduler, Segment::ack(0, 2, true, 0), 3, Endpoint::Sender);
        assert_eq!(at, 8);
        assert_eq!(scheduler.size(), 1);
        // the scripted drop is still queued for the next data segment
        let seg = Segment::data(0, 0, b"x".to_vec(), true, 0);
        assert_eq!(
            link.attempt_deliver(&mut scheduler, seg, 8, Endpoint::Receiver),
            Delivery::Lost
        );
    }

    #[test]
    fn seeded_rng_respects_extremes() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..100).all(|_| !rng.lose(0.0)));
        assert!((0..100).all(|_| rng.lose(1.0)));
    }

    #[test]
    fn same_seed_same_outcomes() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let xs: Vec<bool> = (0..64).map(|_| a.lose(0.5)).collect();
        let ys: Vec<bool> = (0..64).map(|_| b.lose(0.5)).collect();
        assert_eq!(xs, ys);
    }
}
