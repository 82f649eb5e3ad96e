pub mod receiver;
pub mod sender;
pub mod source;

pub use receiver::{ReceiveOutcome, ReceiverSession};
pub use sender::{AckOutcome, PendingTransmission, SenderSession, SenderState, TimeoutOutcome};
pub use source::{LineSource, MessageSource, ScriptedSource};

use crate::event::Event;
use crate::metrics::SimMetrics;
use crate::network::{Delivery, Endpoint, NetworkLink, Segment};
use crate::scheduler::{EventScheduler, SimTime};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a message is already in flight")]
    MessageInFlight,
    #[error("refusing to send an empty message")]
    EmptyMessage,
}

/// What a handler gets to touch while one event is being dispatched.
pub struct Context<'a> {
    pub now: SimTime,
    pub scheduler: &'a mut EventScheduler<Event>,
    pub link: &'a mut NetworkLink,
    pub metrics: &'a mut SimMetrics,
}

impl<'a> Context<'a> {
    pub fn new(
        now: SimTime,
        scheduler: &'a mut EventScheduler<Event>,
        link: &'a mut NetworkLink,
        metrics: &'a mut SimMetrics,
    ) -> Self {
        Self {
            now,
            scheduler,
            link,
            metrics,
        }
    }

    pub fn schedule(&mut self, event: Event, at: SimTime) {
        self.scheduler.schedule(event, at);
    }

    /// Data path: subject to the link's loss model.
    pub fn transmit(&mut self, segment: Segment) -> Delivery {
        let outcome = self
            .link
            .attempt_deliver(self.scheduler, segment, self.now, Endpoint::Receiver);
        if outcome == Delivery::Lost {
            self.metrics.segments_lost += 1;
        }
        outcome
    }

    /// Ack path back to the sender, never dropped.
    pub fn reply(&mut self, segment: Segment) -> SimTime {
        self.link
            .deliver(self.scheduler, segment, self.now, Endpoint::Sender)
    }
}

/// Anything a `ReceivePacket` event can be addressed to.
pub trait SegmentSink {
    fn on_segment_received(
        &mut self,
        segment: Segment,
        ctx: &mut Context<'_>,
    ) -> Result<(), SessionError>;
}

/// Both protocol endpoints plus the sender's message supply.
pub struct Peers {
    pub sender: SenderSession,
    pub receiver: ReceiverSession,
    pub source: Box<dyn MessageSource>,
}

impl Peers {
    pub fn sink(&mut self, to: Endpoint) -> &mut dyn SegmentSink {
        match to {
            Endpoint::Sender => &mut self.sender,
            Endpoint::Receiver => &mut self.receiver,
        }
    }
}
