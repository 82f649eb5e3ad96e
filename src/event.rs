use crate::network::{Endpoint, Segment};
use crate::session::{Context, Peers, SessionError};
use std::fmt;
use tracing::{debug, info};

/// Everything that can sit on the scheduler. The set is closed; adding a kind
/// means adding a match arm in [`Event::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Ask the message source for the next message and start sending it.
    RequestMessage,
    /// A segment arrives at `to`.
    ReceivePacket { to: Endpoint, segment: Segment },
    /// Retransmission timer for one segment of message `epoch`.
    Timeout { seq: u32, epoch: u64 },
}

impl Event {
    pub fn dispatch(self, peers: &mut Peers, ctx: &mut Context<'_>) -> Result<(), SessionError> {
        match self {
            Event::RequestMessage => request_message(peers, ctx),
            Event::ReceivePacket { to, segment } => peers.sink(to).on_segment_received(segment, ctx),
            Event::Timeout { seq, epoch } => {
                peers.sender.on_timeout(seq, epoch, ctx);
                Ok(())
            }
        }
    }
}

fn request_message(peers: &mut Peers, ctx: &mut Context<'_>) -> Result<(), SessionError> {
    let Some(message) = peers.source.next_message() else {
        info!("Message source exhausted at time {}", ctx.now);
        return Ok(());
    };

    if message.is_empty() {
        debug!("Skipping empty message");
        ctx.schedule(Event::RequestMessage, ctx.now);
        return Ok(());
    }

    info!("Sender sends {:?}", String::from_utf8_lossy(&message));
    peers.sender.submit_message(message, ctx)?;
    Ok(())
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RequestMessage => write!(f, "RequestMessage(sender)"),
            Event::ReceivePacket { to, segment } => write!(f, "ReceivePacket({to}, {segment})"),
            Event::Timeout { seq, epoch } => write!(f, "Timeout(seq={seq}, message={epoch})"),
        }
    }
}
