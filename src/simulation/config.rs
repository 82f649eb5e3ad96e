use crate::network::NetworkConfig;
use crate::scheduler::SimTime;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("rto ({rto}) must exceed the round trip of {round_trip}")]
    RtoTooShort { rto: SimTime, round_trip: SimTime },
    #[error("transmission_delay ({0}) is too large to time a round trip")]
    DelayOverflow(SimTime),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub name: String,
    /// Largest payload carved into one segment (P).
    pub max_payload: usize,
    pub transmission_delay: SimTime,
    pub loss_probability: f64,
    pub rto: SimTime,
    /// Segments the sender may have unacknowledged at once.
    pub window: usize,
    /// Window the receiver advertises in every ack.
    pub receive_window: u16,
    /// `None` draws a fresh seed per run.
    pub seed: Option<u64>,
    /// Log one line per dispatched event.
    pub trace: bool,
    /// Stop after this many events even if the queue is not empty.
    pub max_events: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let transmission_delay = 5;
        Self {
            name: "default_sim".to_string(),
            max_payload: 4,
            transmission_delay,
            loss_probability: 0.25,
            rto: 2 * (2 * transmission_delay),
            window: 1,
            receive_window: 64,
            seed: None,
            trace: true,
            max_events: None,
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SimConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(ConfigError::Probability {
                name: "loss_probability",
                value: self.loss_probability,
            });
        }
        if self.max_payload == 0 {
            return Err(ConfigError::Zero("max_payload"));
        }
        if self.window == 0 {
            return Err(ConfigError::Zero("window"));
        }
        let round_trip = self
            .transmission_delay
            .checked_mul(2)
            .ok_or(ConfigError::DelayOverflow(self.transmission_delay))?;
        if self.rto <= round_trip {
            return Err(ConfigError::RtoTooShort {
                rto: self.rto,
                round_trip,
            });
        }
        Ok(())
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            transmission_delay: self.transmission_delay,
            loss_probability: self.loss_probability,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_loss(mut self, probability: f64) -> Self {
        self.loss_probability = probability;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }
}
