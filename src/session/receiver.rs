use super::{Context, SegmentSink, SessionError};
use crate::network::Segment;
use std::mem;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted,
    /// FIN arrived, the message was handed over and state reset.
    Completed,
    /// Sequence number didn't match; nothing was buffered.
    Discarded,
}

/// In-order reassembly only. There is no reordering buffer: anything that is
/// not exactly `expected` is dropped and answered with the current cursor.
#[derive(Debug)]
pub struct ReceiverSession {
    expected: u32,
    buffer: Vec<u8>,
    delivered: Vec<Vec<u8>>,
    receive_window: u16,
}

impl ReceiverSession {
    pub fn new(receive_window: u16) -> Self {
        Self {
            expected: 0,
            buffer: Vec::new(),
            delivered: Vec::new(),
            receive_window,
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Bytes of the message currently being reassembled.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn delivered(&self) -> &[Vec<u8>] {
        &self.delivered
    }

    pub fn take_delivered(&mut self) -> Vec<Vec<u8>> {
        mem::take(&mut self.delivered)
    }

    /// Applies `segment` and builds the acknowledgment to send back.
    pub fn accept(&mut self, segment: &Segment) -> (ReceiveOutcome, Segment) {
        if !segment.verify() {
            warn!("Checksum mismatch on {}", segment);
        }

        if segment.seq() != self.expected {
            debug!(
                "Receiver expected seq {} but got {}, discarding",
                self.expected,
                segment.seq()
            );
            let dup = Segment::ack(segment.ack_number(), self.expected, false, self.receive_window);
            return (ReceiveOutcome::Discarded, dup);
        }

        self.buffer.extend_from_slice(segment.payload());
        self.expected = self.expected.wrapping_add(segment.len() as u32);

        let reply = Segment::ack(
            segment.ack_number(),
            self.expected,
            segment.is_fin(),
            self.receive_window,
        );

        if !segment.is_fin() {
            return (ReceiveOutcome::Accepted, reply);
        }

        let message = mem::take(&mut self.buffer);
        info!("Receiver got {:?}", String::from_utf8_lossy(&message));
        self.delivered.push(message);
        self.expected = 0;
        (ReceiveOutcome::Completed, reply)
    }
}

impl SegmentSink for ReceiverSession {
    fn on_segment_received(
        &mut self,
        segment: Segment,
        ctx: &mut Context<'_>,
    ) -> Result<(), SessionError> {
        let (outcome, reply) = self.accept(&segment);
        match outcome {
            ReceiveOutcome::Completed => {
                ctx.metrics.messages_delivered += 1;
                ctx.metrics.bytes_delivered += segment.len() as u64;
            }
            ReceiveOutcome::Accepted => ctx.metrics.bytes_delivered += segment.len() as u64,
            ReceiveOutcome::Discarded => ctx.metrics.segments_discarded += 1,
        }

        ctx.metrics.acks_sent += 1;
        ctx.reply(reply);
        Ok(())
    }
}
