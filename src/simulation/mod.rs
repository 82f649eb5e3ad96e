pub mod config;
pub mod sweep;

pub use config::{ConfigError, SimConfig};
pub use sweep::{SweepRow, sweep};

use crate::event::Event;
use crate::metrics::SimMetrics;
use crate::network::{LossSource, NetworkLink};
use crate::scheduler::{EventScheduler, SimTime};
use crate::session::{Context, MessageSource, Peers, ReceiverSession, SenderSession};
use anyhow::Result;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub seed: u64,
    pub config: SimConfig,
    pub metrics: SimMetrics,
    pub delivered: Vec<String>,
    /// False when `max_events` cut the run short.
    pub drained: bool,
}

pub struct Simulation {
    config: SimConfig,
    seed: u64,
    scheduler: EventScheduler<Event>,
    link: NetworkLink,
    peers: Peers,
    metrics: SimMetrics,
    now: SimTime,
}

impl Simulation {
    /// Seeded from `config.seed`, or from the thread rng when unset.
    pub fn new(config: SimConfig, source: Box<dyn MessageSource>) -> Result<Self> {
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        let loss = Box::new(StdRng::seed_from_u64(seed));
        Self::build(config, seed, source, loss)
    }

    /// Same as [`Simulation::new`] with the loss draws supplied by the caller.
    pub fn with_loss_source(
        config: SimConfig,
        source: Box<dyn MessageSource>,
        loss: Box<dyn LossSource>,
    ) -> Result<Self> {
        let seed = config.seed.unwrap_or_default();
        Self::build(config, seed, source, loss)
    }

    fn build(
        config: SimConfig,
        seed: u64,
        source: Box<dyn MessageSource>,
        loss: Box<dyn LossSource>,
    ) -> Result<Self> {
        config.validate()?;

        let mut scheduler = EventScheduler::new();
        scheduler.schedule(Event::RequestMessage, 0);

        let peers = Peers {
            sender: SenderSession::new(config.max_payload, config.window, config.rto),
            receiver: ReceiverSession::new(config.receive_window),
            source,
        };

        Ok(Self {
            link: NetworkLink::new(config.network(), loss),
            config,
            seed,
            scheduler,
            peers,
            metrics: SimMetrics::default(),
            now: 0,
        })
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.size()
    }

    pub fn sender(&self) -> &SenderSession {
        &self.peers.sender
    }

    pub fn receiver(&self) -> &ReceiverSession {
        &self.peers.receiver
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Pops and dispatches one event. `Ok(None)` once the queue is empty.
    pub fn step(&mut self) -> Result<Option<SimTime>> {
        if self.scheduler.is_empty() {
            return Ok(None);
        }

        let entry = self.scheduler.pop()?;
        debug_assert!(entry.time >= self.now, "clock went backwards");
        self.now = entry.time;

        if self.config.trace {
            info!("{} at time {}", entry.payload, entry.time);
        }

        let mut ctx = Context::new(self.now, &mut self.scheduler, &mut self.link, &mut self.metrics);
        entry.payload.dispatch(&mut self.peers, &mut ctx)?;

        self.metrics.events_dispatched += 1;
        self.metrics.final_time = self.now;
        Ok(Some(self.now))
    }

    /// Dispatches everything scheduled at or before `limit`.
    pub fn run_until(&mut self, limit: SimTime) -> Result<()> {
        while !self.scheduler.is_empty() && self.scheduler.peek_time()? <= limit {
            self.step()?;
        }
        Ok(())
    }

    /// Runs until the queue drains or `max_events` is hit.
    pub fn run(&mut self) -> Result<RunReport> {
        info!("Starting simulation: {}", self.config.name);
        info!(
            "Seed: {}, loss: {}, window: {}, rto: {}",
            self.seed, self.config.loss_probability, self.config.window, self.config.rto
        );

        let mut drained = true;
        while !self.scheduler.is_empty() {
            if let Some(limit) = self.config.max_events {
                if self.metrics.events_dispatched >= limit {
                    warn!(
                        "Stopping after {} events with {} still queued",
                        limit,
                        self.scheduler.size()
                    );
                    drained = false;
                    break;
                }
            }
            self.step()?;
        }

        info!(
            "Simulation finished at time {}: {} delivered, {} retransmissions",
            self.now, self.metrics.messages_delivered, self.metrics.retransmissions
        );

        Ok(self.report(drained))
    }

    pub fn report(&self, drained: bool) -> RunReport {
        RunReport {
            name: self.config.name.clone(),
            seed: self.seed,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            delivered: self
                .peers
                .receiver
                .delivered()
                .iter()
                .map(|m| String::from_utf8_lossy(m).into_owned())
                .collect(),
            drained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ScriptedLoss;
    use crate::session::{ScriptedSource, SenderState};

    fn quiet() -> SimConfig {
        SimConfig::default().with_trace(false).with_loss(0.0)
    }

    #[test]
    fn empty_source_drains_immediately() {
        let mut sim = Simulation::new(quiet().with_seed(1), Box::new(ScriptedSource::default())).unwrap();
        let report = sim.run().unwrap();
        assert!(report.drained);
        assert_eq!(report.metrics.events_dispatched, 1);
        assert!(report.delivered.is_empty());
    }

    #[test]
    fn invalid_config_is_refused() {
        let result = Simulation::new(quiet().with_window(0), Box::new(ScriptedSource::default()));
        assert!(result.is_err());
    }

    #[test]
    fn clock_never_goes_backwards() {
        let config = quiet().with_loss(0.4).with_seed(11).with_window(3);
        let source = ScriptedSource::from_strs(&["the quick brown fox", "jumps"]);
        let mut sim = Simulation::new(config, Box::new(source)).unwrap();

        let mut last = 0;
        while let Some(t) = sim.step().unwrap() {
            assert!(t >= last);
            last = t;
        }
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn run_until_stops_at_limit() {
        let source = ScriptedSource::from_strs(&["hi"]);
        let mut sim =
            Simulation::with_loss_source(quiet(), Box::new(source), Box::new(ScriptedLoss::never()))
                .unwrap();

        // t=0 request, t=5 arrival at receiver; the ack lands at t=10
        sim.run_until(5).unwrap();
        assert_eq!(sim.now(), 5);
        assert_eq!(sim.receiver().delivered().len(), 1);
        assert_eq!(sim.sender().state(), SenderState::AwaitingAcks);

        sim.run_until(10).unwrap();
        assert_eq!(sim.sender().state(), SenderState::Idle);
    }

    #[test]
    fn max_events_stops_a_hopeless_run() {
        let config = quiet().with_loss(1.0).with_seed(3).with_max_events(50);
        let mut sim = Simulation::new(config, Box::new(ScriptedSource::from_strs(&["lost"]))).unwrap();

        let report = sim.run().unwrap();
        assert!(!report.drained);
        assert_eq!(report.metrics.events_dispatched, 50);
        assert!(report.metrics.retransmissions > 0);
        assert!(report.delivered.is_empty());
    }
}
