//! Synthetic native VC2 streams for the integration tests.

#![allow(dead_code)]

use rtpvc2::bitstream::VlcWriter;
use rtpvc2::parse_info::PARSE_INFO_SIZE;
use rtpvc2::{ParseCode, ParseInfo};

/// Builds a stream with a consistent offset chain.
#[derive(Debug, Default)]
pub struct StreamBuilder {
    out: Vec<u8>,
    last: u32,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(mut self, code: ParseCode, payload: &[u8]) -> Self {
        let size = (PARSE_INFO_SIZE + payload.len()) as u32;
        let next = if code == ParseCode::EndOfSequence { 0 } else { size };
        self.out
            .extend_from_slice(&ParseInfo::new(code, next, self.last).to_bytes());
        self.out.extend_from_slice(payload);
        self.last = if code == ParseCode::EndOfSequence { 0 } else { size };
        self
    }

    pub fn sequence_header(self, base_video_format: u32, picture_coding_mode: u32) -> Self {
        let body = sequence_header_body(base_video_format, picture_coding_mode);
        self.unit(ParseCode::SequenceHeader, &body)
    }

    pub fn picture(self, picture: &Picture) -> Self {
        self.unit(ParseCode::HqPicture, &picture.body())
    }

    pub fn padding(self, len: usize) -> Self {
        self.unit(ParseCode::PaddingData, &vec![0; len])
    }

    pub fn end_of_sequence(self) -> Self {
        self.unit(ParseCode::EndOfSequence, &[])
    }

    pub fn build(self) -> Vec<u8> {
        self.out
    }
}

pub fn sequence_header_body(base_video_format: u32, picture_coding_mode: u32) -> Vec<u8> {
    let mut w = VlcWriter::new();
    for v in [2, 0, 3, 0, base_video_format] {
        w.write_uint(v);
    }
    for _ in 0..8 {
        w.write_bool(false);
    }
    w.write_uint(picture_coding_mode);
    w.finish()
}

/// An HQ picture whose slices all share one layout.
#[derive(Debug, Clone)]
pub struct Picture {
    pub number: u32,
    pub slices_x: u32,
    pub slices_y: u32,
    /// Bytes per component; each slice is `1 + 3 * (1 + component)` long.
    pub component: u8,
}

impl Picture {
    pub fn new(number: u32, slices_x: u32, slices_y: u32, slice_len: usize) -> Self {
        assert!(slice_len >= 4 && (slice_len - 1) % 3 == 0);
        Self {
            number,
            slices_x,
            slices_y,
            component: ((slice_len - 1) / 3 - 1) as u8,
        }
    }

    pub fn slice_len(&self) -> usize {
        1 + 3 * (1 + self.component as usize)
    }

    pub fn slice_count(&self) -> usize {
        (self.slices_x * self.slices_y) as usize
    }

    /// Transform parameters (prefix 0, scalar 1) with a custom quant matrix.
    /// For grids of up to 14 slices per side the block is 6 bytes long.
    pub fn transform_parameters(&self) -> Vec<u8> {
        let mut w = VlcWriter::new();
        for v in [4, 3, self.slices_x, self.slices_y, 0, 1] {
            w.write_uint(v);
        }
        w.write_bool(true);
        for _ in 0..7 {
            w.write_uint(1);
        }
        w.finish()
    }

    pub fn slices(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.slice_count() * self.slice_len());
        for i in 0..self.slice_count() {
            out.push(i as u8); // qindex
            for c in 0..3u8 {
                out.push(self.component);
                out.extend(std::iter::repeat_n(0x50 | c, self.component as usize));
            }
        }
        out
    }

    /// Payload after the parse-info header: number, parameters, slices.
    pub fn body(&self) -> Vec<u8> {
        let mut out = self.number.to_be_bytes().to_vec();
        out.extend(self.transform_parameters());
        out.extend(self.slices());
        out
    }
}

/// Walk a native stream and check every offset link against the true distance.
pub fn assert_chain_consistent(stream: &[u8]) {
    let mut pos = 0;
    let mut prev = 0u32;
    while pos < stream.len() {
        let info = ParseInfo::read(stream, pos).unwrap_or_else(|| panic!("no header at {pos}"));
        assert_eq!(info.prev_parse_offset, prev, "prev offset at {pos}");
        if info.parse_code == ParseCode::EndOfSequence {
            assert_eq!(info.next_parse_offset, 0);
            pos += PARSE_INFO_SIZE;
            prev = 0;
        } else {
            pos += info.next_parse_offset as usize;
            prev = info.next_parse_offset;
        }
    }
    assert_eq!(pos, stream.len());
}
