use super::checksum::checksum16;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use thiserror::Error;

/// Bit values of the flags half of the header halfword.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// Header length in 32-bit words when there are no options.
pub const HEADER_WORDS: u8 = 5;
pub const HEADER_LEN: usize = HEADER_WORDS as usize * 4;

// Byte offset of the checksum field, zeroed while the tag is computed.
const OFF_CHECKSUM: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer holds {got} bytes, need at least {needed}")]
    Truncated { needed: usize, got: usize },
    #[error("header length of {0} words is below the minimum of 5")]
    BadHeaderLength(u8),
}

/// One transport unit. Built once, never mutated; retransmissions resend the
/// same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    checksum: u16,
    payload: Vec<u8>,
}

impl Segment {
    fn build(seq: u32, ack: u32, flags: u8, window: u16, payload: Vec<u8>) -> Self {
        let mut segment = Self {
            seq,
            ack,
            flags,
            window,
            checksum: 0,
            payload,
        };
        segment.checksum = !checksum16(&segment.encode());
        segment
    }

    /// A data segment. Data segments always carry ACK, FIN only on the final chunk.
    pub fn data(seq: u32, ack: u32, payload: Vec<u8>, fin: bool, window: u16) -> Self {
        let mut f = flags::ACK;
        if fin {
            f |= flags::FIN;
        }
        Self::build(seq, ack, f, window, payload)
    }

    /// A payload-free acknowledgment.
    pub fn ack(seq: u32, ack: u32, fin: bool, window: u16) -> Self {
        let mut f = flags::ACK;
        if fin {
            f |= flags::FIN;
        }
        Self::build(seq, ack, f, window, Vec::new())
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn ack_number(&self) -> u32 {
        self.ack
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn window(&self) -> u16 {
        self.window
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First sequence number after this segment's payload.
    pub fn end(&self) -> u32 {
        self.seq.wrapping_add(self.payload.len() as u32)
    }

    /// Recomputes the tag and compares. Nothing in the protocol acts on a
    /// mismatch yet; the receiver only logs it.
    pub fn verify(&self) -> bool {
        let mut wire = self.encode();
        wire[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&[0, 0]);
        !checksum16(&wire) == self.checksum
    }

    /// Serialise into the TCP header layout followed by the payload. Ports and
    /// the urgent pointer are always zero and no options are written.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());

        buf.put_u16(0); // src port
        buf.put_u16(0); // dst port
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u16((u16::from(HEADER_WORDS) << 12) | u16::from(self.flags & 0x3f));
        buf.put_u16(self.window);
        buf.put_u16(self.checksum);
        buf.put_u16(0); // urgent
        buf.put_slice(&self.payload);

        buf.to_vec()
    }

    /// Parse the wire layout. Options are skipped, unknown flag bits kept.
    /// The stored checksum is taken as-is; call [`Segment::verify`] to check it.
    pub fn decode(wire: &[u8]) -> Result<Self, CodecError> {
        if wire.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                got: wire.len(),
            });
        }

        let mut buf = wire;
        let _src = buf.get_u16();
        let _dst = buf.get_u16();
        let seq = buf.get_u32();
        let ack = buf.get_u32();
        let halfword = buf.get_u16();
        let window = buf.get_u16();
        let checksum = buf.get_u16();
        let _urgent = buf.get_u16();

        let hlen = (halfword >> 12) as u8;
        if hlen < HEADER_WORDS {
            return Err(CodecError::BadHeaderLength(hlen));
        }
        let header_bytes = hlen as usize * 4;
        if wire.len() < header_bytes {
            return Err(CodecError::Truncated {
                needed: header_bytes,
                got: wire.len(),
            });
        }

        Ok(Self {
            seq,
            ack,
            flags: (halfword & 0x3f) as u8,
            window,
            checksum,
            payload: wire[header_bytes..].to_vec(),
        })
    }
}

impl fmt::Display for Segment {
    // Only non-default fields are shown, e.g.
    // Segment(seq=4, ack=6, flags=ACK+FIN, window=64, checksum=0xBEEF, data="hi")
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, &str); 6] = [
            (flags::URG, "URG"),
            (flags::ACK, "ACK"),
            (flags::PSH, "PSH"),
            (flags::RST, "RST"),
            (flags::SYN, "SYN"),
            (flags::FIN, "FIN"),
        ];

        let mut args = Vec::new();
        if self.seq != 0 {
            args.push(format!("seq={}", self.seq));
        }
        if self.ack != 0 {
            args.push(format!("ack={}", self.ack));
        }
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        if !set.is_empty() {
            args.push(format!("flags={}", set.join("+")));
        }
        if self.window != 0 {
            args.push(format!("window={}", self.window));
        }
        if self.checksum != 0 {
            args.push(format!("checksum=0x{:04X}", self.checksum));
        }
        if !self.payload.is_empty() {
            args.push(format!("data={:?}", String::from_utf8_lossy(&self.payload)));
        }

        write!(f, "Segment({})", args.join(", "))
    }
}
