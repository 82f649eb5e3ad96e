// Sending side. Segments are carved from the message buffer and kept in a
// registry until their timer fires; an ack only flips the flag, the timer is
// what clears the entry. Timers are never cancelled on the scheduler.

use super::{Context, SegmentSink, SessionError};
use crate::event::Event;
use crate::network::Segment;
use crate::scheduler::SimTime;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Sending,
    AwaitingAcks,
}

#[derive(Debug, Clone)]
pub struct PendingTransmission {
    pub segment: Segment,
    pub acknowledged: bool,
    pub transmissions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Duplicate, out of range, or nothing in flight.
    Ignored,
    Advanced,
    /// The FIN segment is covered; the sender is idle again.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Stale,
    Retransmitted,
}

#[derive(Debug)]
pub struct SenderSession {
    state: SenderState,
    send_base: u32,
    next_seq: u32,
    message: Vec<u8>,
    // keyed by (message epoch, sequence number); sequence numbers restart at
    // zero for every message, so the epoch keeps old timers from matching
    pending: BTreeMap<(u64, u32), PendingTransmission>,
    epoch: u64,
    window: usize,
    peer_window: Option<u16>,
    max_payload: usize,
    rto: SimTime,
}

impl SenderSession {
    pub fn new(max_payload: usize, window: usize, rto: SimTime) -> Self {
        Self {
            state: SenderState::Idle,
            send_base: 0,
            next_seq: 0,
            message: Vec::new(),
            pending: BTreeMap::new(),
            epoch: 0,
            window: window.max(1),
            peer_window: None,
            max_payload: max_payload.max(1),
            rto,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Unacknowledged segments of the current message.
    pub fn in_flight(&self) -> usize {
        self.pending.values().filter(|p| !p.acknowledged).count()
    }

    /// Every registry entry, including acknowledged ones still waiting on
    /// their timer.
    pub fn registry_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, seq: u32) -> Option<&PendingTransmission> {
        self.pending.get(&(self.epoch, seq))
    }

    pub fn effective_window(&self) -> usize {
        match self.peer_window {
            Some(advertised) => self.window.min(usize::from(advertised.max(1))),
            None => self.window,
        }
    }

    fn message_len(&self) -> u32 {
        self.message.len() as u32
    }

    pub fn submit_message(
        &mut self,
        message: Vec<u8>,
        ctx: &mut Context<'_>,
    ) -> Result<usize, SessionError> {
        if self.state != SenderState::Idle {
            return Err(SessionError::MessageInFlight);
        }
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.epoch += 1;
        self.send_base = 0;
        self.next_seq = 0;
        self.message = message;
        ctx.metrics.messages_submitted += 1;

        Ok(self.fill_window(ctx))
    }

    fn fill_window(&mut self, ctx: &mut Context<'_>) -> usize {
        self.state = SenderState::Sending;
        let mut sent = 0;
        while self.next_seq < self.message_len() && self.in_flight() < self.effective_window() {
            if self.send_next_segment(ctx).is_none() {
                break;
            }
            sent += 1;
        }
        self.state = SenderState::AwaitingAcks;
        sent
    }

    /// Carves the next chunk, records it and arms its timer. Returns the
    /// sequence number used, or `None` once the whole message is out.
    pub fn send_next_segment(&mut self, ctx: &mut Context<'_>) -> Option<u32> {
        let total = self.message.len();
        let start = self.next_seq as usize;
        if start >= total {
            return None;
        }

        let end = (start + self.max_payload).min(total);
        let fin = end == total;
        let seq = self.next_seq;
        let segment = Segment::data(seq, 0, self.message[start..end].to_vec(), fin, 0);

        self.pending.insert(
            (self.epoch, seq),
            PendingTransmission {
                segment: segment.clone(),
                acknowledged: false,
                transmissions: 1,
            },
        );
        self.next_seq = end as u32;

        ctx.metrics.segments_sent += 1;
        ctx.transmit(segment);
        ctx.schedule(Event::Timeout { seq, epoch: self.epoch }, ctx.now.saturating_add(self.rto));

        Some(seq)
    }

    pub fn on_ack_received(&mut self, ack: u32, window: u16, ctx: &mut Context<'_>) -> AckOutcome {
        if self.state == SenderState::Idle {
            debug!("Ack {} with nothing in flight", ack);
            ctx.metrics.duplicate_acks += 1;
            return AckOutcome::Ignored;
        }

        self.peer_window = Some(window);

        if ack <= self.send_base || ack > self.next_seq {
            debug!("Ignoring ack {} (base {}, next {})", ack, self.send_base, self.next_seq);
            ctx.metrics.duplicate_acks += 1;
            return AckOutcome::Ignored;
        }

        for (_, pending) in self.pending.range_mut((self.epoch, 0)..(self.epoch, ack)) {
            pending.acknowledged = true;
        }
        self.send_base = ack;

        let fin_acked = self
            .pending
            .range((self.epoch, 0)..(self.epoch, ack))
            .next_back()
            .is_some_and(|(_, p)| p.segment.is_fin() && p.acknowledged);

        if self.send_base == self.message_len() && fin_acked {
            info!(
                "Sender finished message {} ({} bytes) at time {}",
                self.epoch,
                self.message.len(),
                ctx.now
            );
            self.state = SenderState::Idle;
            self.message.clear();
            ctx.metrics.messages_acknowledged += 1;
            return AckOutcome::Completed;
        }

        self.fill_window(ctx);
        AckOutcome::Advanced
    }

    /// Fires for every segment ever sent. Acked or superseded entries make
    /// this a no-op, so it is safe however many times a stale timer fires.
    pub fn on_timeout(&mut self, seq: u32, epoch: u64, ctx: &mut Context<'_>) -> TimeoutOutcome {
        let key = (epoch, seq);
        let Some(pending) = self.pending.get_mut(&key) else {
            debug!("Timeout for unknown segment seq={} message={}", seq, epoch);
            ctx.metrics.stale_timeouts += 1;
            return TimeoutOutcome::Stale;
        };

        if pending.acknowledged {
            self.pending.remove(&key);
            ctx.metrics.stale_timeouts += 1;
            return TimeoutOutcome::Stale;
        }

        pending.transmissions += 1;
        let segment = pending.segment.clone();
        debug!("Retransmitting {} (attempt {})", segment, pending.transmissions);

        ctx.metrics.retransmissions += 1;
        ctx.transmit(segment);
        ctx.schedule(Event::Timeout { seq, epoch }, ctx.now.saturating_add(self.rto));
        TimeoutOutcome::Retransmitted
    }
}

impl SegmentSink for SenderSession {
    fn on_segment_received(
        &mut self,
        segment: Segment,
        ctx: &mut Context<'_>,
    ) -> Result<(), SessionError> {
        if !segment.is_ack() {
            debug!("Sender ignoring non-ack {}", segment);
            return Ok(());
        }

        if self.on_ack_received(segment.ack_number(), segment.window(), ctx) == AckOutcome::Completed {
            ctx.schedule(Event::RequestMessage, ctx.now);
        }
        Ok(())
    }
}
