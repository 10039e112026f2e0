//! VC2 parse-info headers and the scanner that locates them.
//!
//! Every parse unit of a native VC2 stream starts with a 13-byte header:
//!
//! ```text
//!  0       4    5                 9                 13
//! +-------+----+-----------------+-----------------+
//! | BBCD  | PC | next_parse_off  | prev_parse_off  |
//! +-------+----+-----------------+-----------------+
//! ```
//!
//! Offsets are big-endian byte distances to the neighbouring headers; a
//! `next_parse_offset` of 0 means "unknown". The magic can also occur inside
//! coded picture data, so a header is only trusted once the header it points
//! at points back at it.

use std::fmt;

use crate::error::{MalformedKind, Result};

pub const PARSE_INFO_PREFIX: [u8; 4] = *b"BBCD";
pub const PARSE_INFO_SIZE: usize = 13;
/// Header of a reconstructed HQ picture: parse info plus picture number.
pub const PICTURE_HEADER_SIZE: usize = PARSE_INFO_SIZE + 4;

/// Parse codes (SMPTE ST 2042-1 Table 10.1) used by HQ profile streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseCode {
    SequenceHeader,
    EndOfSequence,
    AuxiliaryData,
    PaddingData,
    HqPicture,
    /// Wire-only code for HQ picture fragments; never present in a native stream.
    HqFragment,
    Other(u8),
}

impl ParseCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::SequenceHeader,
            0x10 => Self::EndOfSequence,
            0x20 => Self::AuxiliaryData,
            0x30 => Self::PaddingData,
            0xE8 => Self::HqPicture,
            0xEC => Self::HqFragment,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::SequenceHeader => 0x00,
            Self::EndOfSequence => 0x10,
            Self::AuxiliaryData => 0x20,
            Self::PaddingData => 0x30,
            Self::HqPicture => 0xE8,
            Self::HqFragment => 0xEC,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ParseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SequenceHeader => write!(f, "sequence header"),
            Self::EndOfSequence => write!(f, "end of sequence"),
            Self::AuxiliaryData => write!(f, "auxiliary data"),
            Self::PaddingData => write!(f, "padding data"),
            Self::HqPicture => write!(f, "HQ picture"),
            Self::HqFragment => write!(f, "HQ fragment"),
            Self::Other(code) => write!(f, "parse code {:#04X}", code),
        }
    }
}

/// A decoded parse-info header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseInfo {
    pub parse_code: ParseCode,
    pub next_parse_offset: u32,
    pub prev_parse_offset: u32,
}

impl ParseInfo {
    pub fn new(parse_code: ParseCode, next_parse_offset: u32, prev_parse_offset: u32) -> Self {
        Self {
            parse_code,
            next_parse_offset,
            prev_parse_offset,
        }
    }

    /// Decode the header at `offset`.
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self> {
        let h = offset
            .checked_add(PARSE_INFO_SIZE)
            .and_then(|end| buf.get(offset..end))
            .ok_or(MalformedKind::Truncated)?;
        if h[0..4] != PARSE_INFO_PREFIX {
            return Err(MalformedKind::BadMagic.into());
        }
        Ok(Self {
            parse_code: ParseCode::from_u8(h[4]),
            next_parse_offset: u32::from_be_bytes([h[5], h[6], h[7], h[8]]),
            prev_parse_offset: u32::from_be_bytes([h[9], h[10], h[11], h[12]]),
        })
    }

    /// Like [`parse`](Self::parse), for the scanner: `None` on any failure.
    pub fn read(buf: &[u8], offset: usize) -> Option<Self> {
        Self::parse(buf, offset).ok()
    }

    pub fn to_bytes(&self) -> [u8; PARSE_INFO_SIZE] {
        let mut h = [0u8; PARSE_INFO_SIZE];
        h[0..4].copy_from_slice(&PARSE_INFO_PREFIX);
        h[4] = self.parse_code.as_u8();
        h[5..9].copy_from_slice(&self.next_parse_offset.to_be_bytes());
        h[9..13].copy_from_slice(&self.prev_parse_offset.to_be_bytes());
        h
    }
}

/// First occurrence of the parse-info prefix at or after `from`.
pub fn find_prefix(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(PARSE_INFO_PREFIX.len())
        .position(|w| w == PARSE_INFO_PREFIX)
        .map(|pos| from + pos)
}

/// Read and validate the parse unit whose header starts at `offset`.
///
/// An end-of-sequence header is accepted as is. Any other header is accepted
/// only if the header it leads to carries a matching `prev_parse_offset`.
/// When `next_parse_offset` is 0, successive prefix occurrences after the
/// header are tried in turn. When it is non-zero it is the only candidate:
/// a mismatch rejects the unit.
///
/// On success `next_parse_offset` holds the validated distance. `None` also
/// covers "successor not buffered yet".
pub fn extract_parse_info(buf: &[u8], offset: usize) -> Option<ParseInfo> {
    let mut info = ParseInfo::read(buf, offset)?;

    if info.parse_code == ParseCode::EndOfSequence {
        return Some(info);
    }

    let trusted = info.next_parse_offset != 0;
    if trusted && (info.next_parse_offset as usize) < PARSE_INFO_SIZE {
        return None;
    }

    let mut candidate = if trusted {
        offset.checked_add(info.next_parse_offset as usize)
    } else {
        find_prefix(buf, offset + PARSE_INFO_SIZE)
    };

    loop {
        let next_offset = candidate?;
        let next = ParseInfo::read(buf, next_offset)?;
        let distance = next_offset - offset;

        if distance == next.prev_parse_offset as usize {
            info.next_parse_offset = u32::try_from(distance).ok()?;
            return Some(info);
        }

        if trusted {
            return None;
        }

        candidate = find_prefix(buf, next_offset + PARSE_INFO_PREFIX.len());
    }
}

/// Offset of the first validated parse unit at or after `from`.
pub fn find_parse_info(buf: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    loop {
        let candidate = find_prefix(buf, pos)?;
        if extract_parse_info(buf, candidate).is_some() {
            return Some(candidate);
        }
        pos = candidate + 1;
    }
}

/// Walks the validated parse units of a buffer in stream order.
///
/// Yields `(offset, info)`. After an end-of-sequence unit, scanning resumes
/// right after its header.
#[derive(Debug, Clone)]
pub struct ParseUnits<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ParseUnits<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl Iterator for ParseUnits<'_> {
    type Item = (usize, ParseInfo);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = find_parse_info(self.buf, self.pos)?;
        let info = extract_parse_info(self.buf, offset)?;
        self.pos = match info.parse_code {
            ParseCode::EndOfSequence => offset + PARSE_INFO_SIZE,
            _ => offset + info.next_parse_offset as usize,
        };
        Some((offset, info))
    }
}
