use rand::Rng;

use crate::error::{Result, Vc2Error};

pub const RTP_HEADER_SIZE: usize = 12;

const RTP_VERSION: u8 = 2;

/// Sender-side RTP state: the fields that change from packet to packet.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The timestamp is held on the 90 kHz clock in 64 bits and truncated when
/// written. No padding, extension or CSRCs are ever emitted.
#[derive(Debug)]
pub struct RtpHeader {
    pub pt: u8,
    pub ssrc: u32,
    sequence: u16,
    timestamp: u64,
}

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(pt, ssrc = format_args!("{:#010X}", ssrc), "RTP sender");
        Self {
            pt: pt & 0x7f,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::rng().random())
    }

    /// Sequence number of the next packet.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn advance_timestamp(&mut self, ticks: u32) {
        self.timestamp = self.timestamp.wrapping_add(u64::from(ticks));
    }

    /// Encode the header for the next packet, consuming its sequence number.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_SIZE] {
        let sequence = self.sequence;
        self.sequence = sequence.wrapping_add(1);
        encode_fixed_header(marker, self.pt, sequence, self.timestamp as u32, self.ssrc)
    }
}

fn encode_fixed_header(
    marker: bool,
    pt: u8,
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
) -> [u8; RTP_HEADER_SIZE] {
    let mut out = [0u8; RTP_HEADER_SIZE];
    out[0] = RTP_VERSION << 6;
    out[1] = if marker { 0x80 | pt } else { pt };
    out[2..4].copy_from_slice(&sequence.to_be_bytes());
    out[4..8].copy_from_slice(&timestamp.to_be_bytes());
    out[8..].copy_from_slice(&ssrc.to_be_bytes());
    out
}

/// A received RTP packet, borrowed from its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Split an RTP packet into header fields and payload.
    ///
    /// CSRCs, a header extension and padding are skipped.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(Vc2Error::Rtp("packet shorter than fixed header"));
        }
        if data[0] >> 6 != RTP_VERSION {
            return Err(Vc2Error::Rtp("unsupported RTP version"));
        }

        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0f) as usize;

        let mut start = RTP_HEADER_SIZE + 4 * csrc_count;
        if extension {
            let ext = data
                .get(start..start + 4)
                .ok_or(Vc2Error::Rtp("truncated header extension"))?;
            let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
            start += 4 + 4 * words;
        }

        let mut end = data.len();
        if padding {
            let pad = *data.last().unwrap_or(&0) as usize;
            end = end
                .checked_sub(pad)
                .ok_or(Vc2Error::Rtp("padding longer than packet"))?;
        }
        if start > end {
            return Err(Vc2Error::Rtp("header longer than packet"));
        }

        Ok(Self {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7f,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload: &data[start..end],
        })
    }
}
