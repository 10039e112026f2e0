//! RTP payload format for VC2 HQ (draft-ietf-payload-rtp-vc2hq).
//!
//! Every RTP payload starts with a 4-byte common header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Extended Sequence Number    |   Reserved  |I|F|  Parse Code  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Sequence headers carry the raw header bytes after it; end of sequence
//! carries nothing. HQ picture fragments (parse code `0xEC`) carry a further
//! fixed header followed by either the transform parameters (`slice_count`
//! 0) or a run of whole slices:
//!
//! ```text
//! +---------------+---------+---------+---------+---------+---------+---------+
//! | picture no(4) | prefix  | scalar  | length  | slices  | slice_x | slice_y |
//! +---------------+---------+---------+---------+---------+---------+---------+
//!                                                          (only when slices > 0)
//! ```
//!
//! The RTP marker bit flags the last fragment of a picture.

pub mod depay;
pub mod envelope;
pub mod header;
pub mod pay;

pub use depay::Depayloader;
pub use envelope::{RtpDepacketizer, RtpPacketizer};
pub use header::{RtpHeader, RtpPacket};
pub use pay::{Payloader, PayloaderConfig};

use crate::error::{MalformedKind, Result};
use crate::parse_info::ParseCode;

/// Bytes of the common payload header.
pub const COMMON_HEADER_SIZE: usize = 4;
/// HQ fragment header without slice coordinates.
pub const HQ_HEADER_SIZE: usize = 12;
/// HQ fragment header with slice coordinates.
pub const HQ_SLICE_HEADER_SIZE: usize = 16;

pub const CLOCK_RATE: u32 = 90000;
pub const ENCODING_NAME: &str = "VC2";

/// Interlace bits of the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFlags {
    Progressive,
    FirstField,
    SecondField,
}

impl FieldFlags {
    /// Flags for a picture of an interlaced or progressive sequence.
    /// Odd picture numbers are second fields.
    pub fn for_picture(interlaced: bool, picture_number: u32) -> Self {
        match (interlaced, picture_number & 1) {
            (false, _) => Self::Progressive,
            (true, 0) => Self::FirstField,
            (true, _) => Self::SecondField,
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        match (bits & 0x2 != 0, bits & 0x1 != 0) {
            (false, _) => Self::Progressive,
            (true, false) => Self::FirstField,
            (true, true) => Self::SecondField,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Progressive => 0x00,
            Self::FirstField => 0x02,
            Self::SecondField => 0x03,
        }
    }
}

/// One RTP payload produced by the [`Payloader`].
///
/// The payload always starts with the common header; the envelope (RTP
/// fixed header) is added by the transport. Timestamps are those of the
/// input buffer holding the first byte of the parse unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    payload: Vec<u8>,
    pub marker: bool,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

impl Fragment {
    /// Wrap an encoded payload. Fails if it cannot hold the common header.
    pub fn new(
        payload: Vec<u8>,
        marker: bool,
        pts: Option<u64>,
        dts: Option<u64>,
    ) -> Result<Self> {
        if payload.len() < COMMON_HEADER_SIZE {
            return Err(MalformedKind::Truncated.into());
        }
        Ok(Self {
            payload,
            marker,
            pts,
            dts,
        })
    }

    /// Common header and body, as sent on the wire.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn ext_seq(&self) -> u16 {
        u16::from_be_bytes([self.payload[0], self.payload[1]])
    }

    pub fn field_flags(&self) -> FieldFlags {
        FieldFlags::from_bits(self.payload[2])
    }

    pub fn parse_code(&self) -> ParseCode {
        ParseCode::from_u8(self.payload[3])
    }

    /// Payload after the common header.
    pub fn body(&self) -> &[u8] {
        &self.payload[COMMON_HEADER_SIZE..]
    }

    /// HQ fragment header, if this is an HQ picture fragment.
    pub fn hq_header(&self) -> Option<HqFragmentHeader> {
        match self.parse_code() {
            ParseCode::HqFragment => HqFragmentHeader::parse(self.body()).ok(),
            _ => None,
        }
    }
}

/// Transport side of the payloader: where fragments go, and how big they may be.
pub trait FragmentSink {
    /// Largest fragment accepted, counted after the common header.
    fn mtu(&self) -> usize;

    fn push(&mut self, fragment: Fragment) -> Result<()>;
}

/// Fixed header of an HQ picture fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HqFragmentHeader {
    pub picture_number: u32,
    pub slice_prefix_bytes: u16,
    pub slice_size_scalar: u16,
    pub fragment_length: u16,
    pub slice_count: u16,
    /// Coordinates of the first slice; `None` for transform parameters.
    pub slice_offset: Option<(u16, u16)>,
}

impl HqFragmentHeader {
    pub fn size(&self) -> usize {
        if self.slice_count == 0 {
            HQ_HEADER_SIZE
        } else {
            HQ_SLICE_HEADER_SIZE
        }
    }

    /// Decode the header at the start of `body` (the bytes after the
    /// common header). Slice coordinates are read only when present.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let b = body.get(..HQ_HEADER_SIZE).ok_or(MalformedKind::Truncated)?;
        let be16 = |i: usize| u16::from_be_bytes([b[i], b[i + 1]]);

        let slice_count = be16(10);
        let slice_offset = if slice_count == 0 {
            None
        } else {
            let s = body
                .get(HQ_HEADER_SIZE..HQ_SLICE_HEADER_SIZE)
                .ok_or(MalformedKind::Truncated)?;
            Some((
                u16::from_be_bytes([s[0], s[1]]),
                u16::from_be_bytes([s[2], s[3]]),
            ))
        };

        Ok(Self {
            picture_number: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            slice_prefix_bytes: be16(4),
            slice_size_scalar: be16(6),
            fragment_length: be16(8),
            slice_count,
            slice_offset,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.picture_number.to_be_bytes());
        out.extend_from_slice(&self.slice_prefix_bytes.to_be_bytes());
        out.extend_from_slice(&self.slice_size_scalar.to_be_bytes());
        out.extend_from_slice(&self.fragment_length.to_be_bytes());
        out.extend_from_slice(&self.slice_count.to_be_bytes());
        if let Some((x, y)) = self.slice_offset {
            out.extend_from_slice(&x.to_be_bytes());
            out.extend_from_slice(&y.to_be_bytes());
        }
    }
}
