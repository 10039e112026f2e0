use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Vc2Error;
use crate::parse_info::{PARSE_INFO_SIZE, PICTURE_HEADER_SIZE, ParseCode, ParseInfo};

use super::{COMMON_HEADER_SIZE, FieldFlags, HqFragmentHeader};

/// VC2 HQ depayloader: RTP payload fragments in, native parse units out.
///
/// Offsets in the regenerated parse-info headers are threaded so that the
/// output forms a consistent chain: each unit's `prev_parse_offset` is the
/// size of the unit emitted before it.
///
/// Picture fragments are accumulated until the one carrying the marker bit;
/// a lost or mismatched fragment drops the whole picture.
#[derive(Debug)]
pub struct Depayloader {
    picture: BytesMut,
    waiting_for_start: bool,
    in_picture: bool,
    picture_number: u32,
    last_parse_info_offset: u32,
}

impl Depayloader {
    pub fn new() -> Self {
        Self {
            picture: BytesMut::new(),
            waiting_for_start: true,
            in_picture: false,
            picture_number: 0,
            last_parse_info_offset: 0,
        }
    }

    /// True until a sequence header or the start of a picture has been seen.
    pub fn is_waiting_for_start(&self) -> bool {
        self.waiting_for_start
    }

    pub fn in_picture(&self) -> bool {
        self.in_picture
    }

    /// Drop any partial picture and restart the offset chain.
    pub fn reset(&mut self) {
        self.picture.clear();
        self.waiting_for_start = true;
        self.in_picture = false;
        self.picture_number = 0;
        self.last_parse_info_offset = 0;
        tracing::debug!("depayloader reset");
    }

    /// Handle one RTP payload (common header included).
    ///
    /// `discont` signals a gap in the transport before this payload.
    /// Returns a completed parse unit, if this fragment finished one.
    pub fn process(&mut self, payload: &[u8], marker: bool, discont: bool) -> Option<Bytes> {
        if discont {
            tracing::debug!("discontinuity, dropping reassembly state");
            self.reset();
        }

        let Some(common) = payload.get(..COMMON_HEADER_SIZE) else {
            tracing::warn!(bytes = payload.len(), "payload shorter than common header");
            return None;
        };
        let flags = FieldFlags::from_bits(common[2]);
        let code = ParseCode::from_u8(common[3]);
        let body = &payload[COMMON_HEADER_SIZE..];

        tracing::trace!(parse_code = %code, ?flags, marker, bytes = body.len(), "fragment");

        match code {
            ParseCode::SequenceHeader => Some(self.sequence_header(body)),
            ParseCode::EndOfSequence => Some(self.end_of_sequence()),
            ParseCode::HqFragment => self.hq_fragment(body, marker),
            other => {
                tracing::debug!(parse_code = %other, "ignoring fragment");
                None
            }
        }
    }

    fn sequence_header(&mut self, body: &[u8]) -> Bytes {
        let next = (body.len() + PARSE_INFO_SIZE) as u32;
        let info = ParseInfo::new(ParseCode::SequenceHeader, next, self.last_parse_info_offset);

        let mut out = BytesMut::with_capacity(next as usize);
        out.put_slice(&info.to_bytes());
        out.put_slice(body);

        self.last_parse_info_offset = next;
        if self.waiting_for_start {
            tracing::debug!("sequence header received, stream started");
            self.waiting_for_start = false;
        }
        out.freeze()
    }

    fn end_of_sequence(&mut self) -> Bytes {
        let info = ParseInfo::new(ParseCode::EndOfSequence, 0, self.last_parse_info_offset);
        self.last_parse_info_offset = 0;
        tracing::debug!(waiting = self.waiting_for_start, "end of sequence");
        Bytes::copy_from_slice(&info.to_bytes())
    }

    fn hq_fragment(&mut self, body: &[u8], marker: bool) -> Option<Bytes> {
        let header = match HqFragmentHeader::parse(body) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(error = %e, "dropping HQ fragment");
                self.abort_picture();
                return None;
            }
        };

        let data = &body[header.size()..];
        let declared = header.fragment_length as usize;
        if declared > data.len() {
            let e = Vc2Error::FragmentLength {
                declared,
                available: data.len(),
            };
            tracing::warn!(
                error = %e,
                picture_number = header.picture_number,
                "dropping HQ fragment"
            );
            self.abort_picture();
            return None;
        }
        let data = &data[..declared];

        if header.slice_count == 0 {
            if self.in_picture {
                tracing::debug!(
                    picture_number = self.picture_number,
                    "picture incomplete, starting next one"
                );
            }
            self.picture.clear();
            self.in_picture = true;
            self.waiting_for_start = false;
            self.picture_number = header.picture_number;
            tracing::debug!(picture_number = header.picture_number, "picture start");
        } else if !self.in_picture {
            tracing::debug!(
                picture_number = header.picture_number,
                "slice fragment outside a picture, dropped"
            );
            return None;
        } else if header.picture_number != self.picture_number {
            let e = Vc2Error::SequenceMismatch {
                expected: self.picture_number,
                found: header.picture_number,
            };
            tracing::warn!(error = %e, "dropping picture");
            self.abort_picture();
            return None;
        }

        self.picture.put_slice(data);

        if marker {
            return Some(self.complete_picture());
        }
        None
    }

    fn complete_picture(&mut self) -> Bytes {
        let size = PICTURE_HEADER_SIZE + self.picture.len();
        let info = ParseInfo::new(ParseCode::HqPicture, size as u32, self.last_parse_info_offset);

        let mut out = BytesMut::with_capacity(size);
        out.put_slice(&info.to_bytes());
        out.put_u32(self.picture_number);
        out.put_slice(&self.picture);

        self.picture.clear();
        self.in_picture = false;
        self.last_parse_info_offset = size as u32;

        tracing::debug!(
            picture_number = self.picture_number,
            bytes = size,
            "picture complete"
        );
        out.freeze()
    }

    fn abort_picture(&mut self) {
        self.picture.clear();
        self.in_picture = false;
    }
}

impl Default for Depayloader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: ParseCode, flags: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0, 0, flags, code.as_u8()];
        out.extend_from_slice(body);
        out
    }

    fn hq(picture_number: u32, slices: Option<(u16, u16, u16)>, data: &[u8]) -> Vec<u8> {
        let header = HqFragmentHeader {
            picture_number,
            slice_prefix_bytes: 0,
            slice_size_scalar: 1,
            fragment_length: data.len() as u16,
            slice_count: slices.map_or(0, |s| s.0),
            slice_offset: slices.map(|s| (s.1, s.2)),
        };
        let mut body = Vec::new();
        header.write_to(&mut body);
        body.extend_from_slice(data);
        payload(ParseCode::HqFragment, 0, &body)
    }

    #[test]
    fn sequence_header_is_rewrapped() {
        let mut d = Depayloader::new();
        assert!(d.is_waiting_for_start());

        let seq = payload(ParseCode::SequenceHeader, 0, &[1, 2, 3]);
        let out = d.process(&seq, false, false).unwrap();
        let info = ParseInfo::read(&out, 0).unwrap();
        assert_eq!(info.parse_code, ParseCode::SequenceHeader);
        assert_eq!(info.next_parse_offset, 16);
        assert_eq!(info.prev_parse_offset, 0);
        assert_eq!(&out[13..], &[1, 2, 3]);
        assert!(!d.is_waiting_for_start());

        let out = d.process(&seq, false, false).unwrap();
        assert_eq!(ParseInfo::read(&out, 0).unwrap().prev_parse_offset, 16);
    }

    #[test]
    fn picture_is_reassembled_on_marker() {
        let mut d = Depayloader::new();
        d.process(&payload(ParseCode::SequenceHeader, 0, &[7; 4]), false, false);

        assert!(d.process(&hq(5, None, &[0xA0; 6]), false, false).is_none());
        assert!(d.in_picture());
        assert!(d.process(&hq(5, Some((2, 0, 0)), &[0xB0; 10]), false, false).is_none());
        let out = d.process(&hq(5, Some((1, 0, 1)), &[0xC0; 3]), true, false).unwrap();

        let info = ParseInfo::read(&out, 0).unwrap();
        assert_eq!(info.parse_code, ParseCode::HqPicture);
        assert_eq!(info.next_parse_offset as usize, out.len());
        assert_eq!(info.prev_parse_offset, 17);
        assert_eq!(&out[13..17], &5u32.to_be_bytes());
        assert_eq!(out.len(), 17 + 6 + 10 + 3);
        assert_eq!(&out[17..23], &[0xA0; 6]);
        assert_eq!(&out[33..], &[0xC0; 3]);
        assert!(!d.in_picture());
    }

    #[test]
    fn end_of_sequence_closes_chain() {
        let mut d = Depayloader::new();
        let eos = payload(ParseCode::EndOfSequence, 0, &[]);
        let out = d.process(&eos, false, false).unwrap();
        assert_eq!(out.len(), PARSE_INFO_SIZE);
        assert_eq!(ParseInfo::read(&out, 0).unwrap().prev_parse_offset, 0);
        assert!(d.is_waiting_for_start());

        d.process(&payload(ParseCode::SequenceHeader, 0, &[0; 7]), false, false);
        let out = d.process(&eos, false, false).unwrap();
        let info = ParseInfo::read(&out, 0).unwrap();
        assert_eq!(out.len(), PARSE_INFO_SIZE);
        assert_eq!(info.next_parse_offset, 0);
        assert_eq!(info.prev_parse_offset, 20);

        let seq = payload(ParseCode::SequenceHeader, 0, &[0; 7]);
        let out = d.process(&seq, false, false).unwrap();
        assert_eq!(ParseInfo::read(&out, 0).unwrap().prev_parse_offset, 0);
    }

    #[test]
    fn mismatched_picture_number_aborts() {
        let mut d = Depayloader::new();
        d.process(&hq(1, None, &[0; 6]), false, false);
        assert!(d.process(&hq(2, Some((1, 0, 0)), &[0; 4]), true, false).is_none());
        assert!(!d.in_picture());
        // Remaining fragments of the aborted picture are ignored.
        assert!(d.process(&hq(1, Some((1, 1, 0)), &[0; 4]), true, false).is_none());
    }

    #[test]
    fn declared_length_beyond_payload_aborts() {
        let mut d = Depayloader::new();
        d.process(&hq(1, None, &[0; 6]), false, false);

        let mut bad = hq(1, Some((1, 0, 0)), &[0; 4]);
        bad[COMMON_HEADER_SIZE + 8..COMMON_HEADER_SIZE + 10].copy_from_slice(&100u16.to_be_bytes());
        assert!(d.process(&bad, true, false).is_none());
        assert!(!d.in_picture());
    }

    #[test]
    fn short_fragments_are_dropped() {
        let mut d = Depayloader::new();
        assert!(d.process(&[0, 0], true, false).is_none());
        assert!(d.process(&payload(ParseCode::HqFragment, 0, &[0; 11]), true, false).is_none());
        assert!(d.process(&payload(ParseCode::AuxiliaryData, 0, &[1]), true, false).is_none());
    }

    #[test]
    fn zero_slice_picture_completes_on_params_marker() {
        let mut d = Depayloader::new();
        let out = d.process(&hq(9, None, &[0x11; 5]), true, false).unwrap();
        assert_eq!(out.len(), 17 + 5);
        assert!(!d.is_waiting_for_start());
    }

    #[test]
    fn discontinuity_resets() {
        let mut d = Depayloader::new();
        d.process(&payload(ParseCode::SequenceHeader, 0, &[0; 3]), false, false);
        d.process(&hq(3, None, &[0; 6]), false, false);
        assert!(d.in_picture());

        assert!(d.process(&hq(3, Some((1, 0, 0)), &[0; 4]), true, true).is_none());
        assert!(d.is_waiting_for_start());
        assert!(!d.in_picture());

        let seq = payload(ParseCode::SequenceHeader, 0, &[0; 3]);
        let out = d.process(&seq, false, false).unwrap();
        assert_eq!(ParseInfo::read(&out, 0).unwrap().prev_parse_offset, 0);
    }

    #[test]
    fn end_of_sequence_survives_discontinuity() {
        let mut d = Depayloader::new();
        d.process(&payload(ParseCode::SequenceHeader, 0, &[0; 3]), false, false);
        d.process(&hq(3, None, &[0; 6]), false, false);

        let eos = payload(ParseCode::EndOfSequence, 0, &[]);
        let out = d.process(&eos, false, true).unwrap();
        let info = ParseInfo::read(&out, 0).unwrap();
        assert_eq!(info.parse_code, ParseCode::EndOfSequence);
        assert_eq!(info.next_parse_offset, 0);
        assert_eq!(info.prev_parse_offset, 0);
        assert!(!d.in_picture());
    }
}
