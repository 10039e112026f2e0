use crate::adapter::Adapter;
use crate::bitstream::{SequenceHeader, TransformParameters};
use crate::error::{MalformedKind, Result, Vc2Error};
use crate::parse_info::{self, PARSE_INFO_PREFIX, PARSE_INFO_SIZE, ParseCode, ParseInfo};

use super::{
    COMMON_HEADER_SIZE, FieldFlags, Fragment, FragmentSink, HQ_SLICE_HEADER_SIZE,
    HqFragmentHeader,
};

pub const DEFAULT_MTU: usize = 1400;

/// Payloader settings.
#[derive(Debug, Clone)]
pub struct PayloaderConfig {
    /// Largest fragment, counted after the 4-byte common header.
    pub mtu: usize,
    /// First extended sequence number written.
    pub initial_ext_seq: u16,
}

impl Default for PayloaderConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            initial_ext_seq: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayState {
    /// No validated parse-unit boundary at the front of the adapter.
    Unsync,
    /// The adapter starts on a parse-unit header.
    Sync,
}

/// VC2 HQ payloader: native parse units in, RTP payload fragments out.
///
/// Input buffers may split or merge parse units arbitrarily; bytes wait in
/// an [`Adapter`] until a whole unit and the header of its successor are
/// available (see [`parse_info::extract_parse_info`]).
///
/// Per unit:
///
/// - **Sequence header**: cached (re-parsed only when its bytes change) and
///   sent as one fragment.
/// - **HQ picture**: one fragment with the transform parameters, then slices
///   packed greedily into fragments no larger than the MTU. The marker bit
///   is set on the last fragment.
/// - **End of sequence**: one fragment; the payloader drops back to
///   [`PayState::Unsync`].
/// - **Auxiliary, padding and unknown data**: skipped.
///
/// Malformed units are consumed and logged without emitting anything.
#[derive(Debug)]
pub struct Payloader {
    config: PayloaderConfig,
    adapter: Adapter,
    state: PayState,
    seq_hdr: Option<SequenceHeader>,
    next_ext_seq: u16,
}

impl Payloader {
    pub fn new() -> Self {
        Self::build(PayloaderConfig::default())
    }

    pub fn with_config(config: PayloaderConfig) -> Result<Self> {
        check_mtu(config.mtu)?;
        Ok(Self::build(config))
    }

    fn build(config: PayloaderConfig) -> Self {
        Self {
            next_ext_seq: config.initial_ext_seq,
            config,
            adapter: Adapter::new(),
            state: PayState::Unsync,
            seq_hdr: None,
        }
    }

    pub fn mtu(&self) -> usize {
        self.config.mtu
    }

    pub fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        check_mtu(mtu)?;
        self.config.mtu = mtu;
        Ok(())
    }

    pub fn state(&self) -> PayState {
        self.state
    }

    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.seq_hdr.as_ref()
    }

    /// Bytes buffered but not yet payloaded.
    pub fn pending(&self) -> usize {
        self.adapter.len()
    }

    /// Append native stream bytes and payload every parse unit that can be
    /// delimited.
    ///
    /// `pts`/`dts` belong to `data`. Each fragment carries the timestamps of
    /// the buffer holding the first byte of its parse unit, which may be an
    /// earlier call than the one that completed it.
    pub fn handle_buffer(
        &mut self,
        data: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
    ) -> Vec<Fragment> {
        self.adapter.push(data, pts, dts);

        let mut fragments = Vec::new();
        while self.adapter.len() >= PARSE_INFO_SIZE {
            if self.state == PayState::Unsync && !self.sync() {
                break;
            }

            let Some(info) = parse_info::extract_parse_info(self.adapter.as_slice(), 0) else {
                if self.is_unrecoverable() {
                    tracing::warn!("parse unit at sync point failed validation, resyncing");
                    self.adapter.flush(1);
                    self.state = PayState::Unsync;
                    continue;
                }
                break;
            };

            let (pts, dts) = self.adapter.timestamps();
            self.handle_unit(info, pts, dts, &mut fragments);
        }

        tracing::trace!(
            fragments = fragments.len(),
            pending = self.adapter.len(),
            ext_seq = self.next_ext_seq,
            "buffer payloaded"
        );

        fragments
    }

    /// Process `data` and forward the fragments to `sink`, using its MTU.
    pub fn push_to<S: FragmentSink>(
        &mut self,
        data: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
        sink: &mut S,
    ) -> Result<()> {
        self.set_mtu(sink.mtu())?;
        for fragment in self.handle_buffer(data, pts, dts) {
            sink.push(fragment)?;
        }
        Ok(())
    }

    /// End of stream: payload what can still be delimited and drop the rest.
    pub fn finish(&mut self) -> Vec<Fragment> {
        let fragments = self.handle_buffer(&[], None, None);
        if !self.adapter.is_empty() {
            tracing::debug!(bytes = self.adapter.len(), "discarding undelimited tail");
            self.adapter.clear();
        }
        fragments
    }

    /// Flush: drop buffered input and wait for a new sync point.
    ///
    /// The cached sequence header and extended sequence number survive.
    pub fn reset(&mut self) {
        self.adapter.clear();
        self.state = PayState::Unsync;
        tracing::debug!("payloader reset");
    }

    /// Find a validated parse unit and drop the bytes before it.
    fn sync(&mut self) -> bool {
        let buf = self.adapter.as_slice();
        match parse_info::find_parse_info(buf, 0) {
            Some(offset) => {
                self.adapter.flush(offset);
                self.state = PayState::Sync;
                tracing::debug!(skipped = offset, "synchronised to parse unit");
                true
            }
            None => {
                // Nothing before the last possible partial prefix can start a unit.
                if parse_info::find_prefix(buf, 0).is_none() {
                    let discard = buf.len().saturating_sub(PARSE_INFO_PREFIX.len() - 1);
                    self.adapter.flush(discard);
                }
                false
            }
        }
    }

    /// Whether the unit at the front can never validate, whatever arrives next.
    fn is_unrecoverable(&self) -> bool {
        let buf = self.adapter.as_slice();
        match ParseInfo::read(buf, 0) {
            None => true,
            Some(info) => {
                let next = info.next_parse_offset as usize;
                next != 0 && (next < PARSE_INFO_SIZE || next + PARSE_INFO_SIZE <= buf.len())
            }
        }
    }

    fn handle_unit(
        &mut self,
        info: ParseInfo,
        pts: Option<u64>,
        dts: Option<u64>,
        fragments: &mut Vec<Fragment>,
    ) {
        let size = info.next_parse_offset as usize;

        match info.parse_code {
            ParseCode::SequenceHeader => {
                self.adapter.flush(PARSE_INFO_SIZE);
                let body = self.adapter.take(size - PARSE_INFO_SIZE);
                if let Some(fragment) = self.payload_sequence_header(&body, pts, dts) {
                    fragments.push(fragment);
                }
            }
            ParseCode::HqPicture => {
                self.adapter.flush(PARSE_INFO_SIZE);
                let body = self.adapter.take(size - PARSE_INFO_SIZE);
                match self.payload_picture(&body, pts, dts) {
                    Ok(mut picture) => fragments.append(&mut picture),
                    Err(e) => tracing::warn!(error = %e, "dropping HQ picture"),
                }
            }
            ParseCode::EndOfSequence => {
                self.adapter.flush(PARSE_INFO_SIZE);
                self.state = PayState::Unsync;
                tracing::debug!("end of sequence");
                let eos = self.fragment(
                    ParseCode::EndOfSequence,
                    FieldFlags::Progressive,
                    &[],
                    false,
                    pts,
                    dts,
                );
                fragments.push(eos);
            }
            ParseCode::AuxiliaryData | ParseCode::PaddingData => {
                self.adapter.flush(size);
            }
            other => {
                tracing::debug!(parse_code = %other, bytes = size, "skipping parse unit");
                self.adapter.flush(size);
            }
        }
    }

    fn payload_sequence_header(
        &mut self,
        body: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
    ) -> Option<Fragment> {
        let cached = self.seq_hdr.as_ref().is_some_and(|h| h.same_as(body));
        if !cached {
            match SequenceHeader::parse(body) {
                Ok(hdr) => {
                    tracing::debug!(
                        width = hdr.picture_width,
                        height = hdr.picture_height,
                        interlaced = hdr.interlaced,
                        "sequence header changed"
                    );
                    self.seq_hdr = Some(hdr);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping sequence header");
                    self.seq_hdr = None;
                    return None;
                }
            }
        }

        let raw = self.seq_hdr.as_ref()?.raw().to_vec();
        Some(self.fragment(
            ParseCode::SequenceHeader,
            FieldFlags::Progressive,
            &raw,
            false,
            pts,
            dts,
        ))
    }

    /// Split one HQ picture (payload after its parse-info header) into fragments.
    ///
    /// The slice layout is checked against the picture size before anything
    /// is emitted, so a malformed picture produces no fragments at all.
    fn payload_picture(
        &mut self,
        body: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
    ) -> Result<Vec<Fragment>> {
        let picture = body.get(..4).ok_or(MalformedKind::Truncated)?;
        let picture_number = u32::from_be_bytes([picture[0], picture[1], picture[2], picture[3]]);

        let params = TransformParameters::parse(&body[4..])?;
        if params.coded_size > u16::MAX as usize {
            return Err(MalformedKind::FragmentTooLarge(params.coded_size).into());
        }
        let params_end = 4 + params.coded_size;
        let slice_data = &body[params_end..];

        let slices = slice_lengths(&params, slice_data)?;
        let groups = pack_slices(&params, &slices, self.config.mtu);

        let interlaced = self.seq_hdr.as_ref().is_some_and(|h| h.interlaced);
        let flags = FieldFlags::for_picture(interlaced, picture_number);

        let mut header = HqFragmentHeader {
            picture_number,
            slice_prefix_bytes: params.slice_prefix_bytes as u16,
            slice_size_scalar: params.slice_size_scalar as u16,
            fragment_length: params.coded_size as u16,
            slice_count: 0,
            slice_offset: None,
        };

        let mut fragments = Vec::with_capacity(groups.len() + 1);
        let mut data = Vec::with_capacity(HQ_SLICE_HEADER_SIZE + params.coded_size);
        header.write_to(&mut data);
        data.extend_from_slice(&body[4..params_end]);
        let only = groups.is_empty();
        fragments.push(self.fragment(ParseCode::HqFragment, flags, &data, only, pts, dts));

        for (i, group) in groups.iter().enumerate() {
            header.fragment_length = group.len as u16;
            header.slice_count = group.count;
            header.slice_offset = Some((group.x, group.y));

            data.clear();
            header.write_to(&mut data);
            data.extend_from_slice(&slice_data[group.start..group.start + group.len]);

            let last = i + 1 == groups.len();
            fragments.push(self.fragment(ParseCode::HqFragment, flags, &data, last, pts, dts));
        }

        tracing::trace!(
            picture_number,
            slices = slices.len(),
            fragments = fragments.len(),
            "HQ picture payloaded"
        );

        Ok(fragments)
    }

    fn fragment(
        &mut self,
        code: ParseCode,
        flags: FieldFlags,
        body: &[u8],
        marker: bool,
        pts: Option<u64>,
        dts: Option<u64>,
    ) -> Fragment {
        let mut payload = Vec::with_capacity(COMMON_HEADER_SIZE + body.len());
        payload.extend_from_slice(&self.next_ext_seq.to_be_bytes());
        payload.push(flags.bits());
        payload.push(code.as_u8());
        payload.extend_from_slice(body);

        self.next_ext_seq = self.next_ext_seq.wrapping_add(1);

        Fragment {
            payload,
            marker,
            pts,
            dts,
        }
    }
}

impl Default for Payloader {
    fn default() -> Self {
        Self::new()
    }
}

fn check_mtu(mtu: usize) -> Result<()> {
    if mtu <= HQ_SLICE_HEADER_SIZE {
        return Err(Vc2Error::InvalidMtu(mtu));
    }
    Ok(())
}

/// Byte length of every slice, in raster order.
///
/// An HQ slice is `slice_prefix_bytes` of prefix, a quantiser index byte,
/// then three components, each a length byte followed by
/// `length * slice_size_scalar` bytes.
fn slice_lengths(params: &TransformParameters, data: &[u8]) -> Result<Vec<usize>> {
    if params.slices_x > u16::MAX as u32 || params.slices_y > u16::MAX as u32 {
        let largest = params.slices_x.max(params.slices_y);
        return Err(MalformedKind::FragmentTooLarge(largest as usize).into());
    }
    if params.slice_prefix_bytes > u16::MAX as u32 || params.slice_size_scalar > u16::MAX as u32 {
        return Err(MalformedKind::FragmentTooLarge(
            params.slice_prefix_bytes.max(params.slice_size_scalar) as usize,
        )
        .into());
    }

    let prefix = params.slice_prefix_bytes as usize;
    let scalar = params.slice_size_scalar as usize;
    // Every slice holds at least its prefix, qindex and three length bytes.
    if params.slice_count() > (data.len() / (prefix + 4)) as u64 {
        return Err(MalformedKind::SliceOverrun.into());
    }
    let count = params.slice_count() as usize;
    let byte_at = |i: usize| {
        data.get(i)
            .copied()
            .map(usize::from)
            .ok_or(MalformedKind::SliceOverrun)
    };

    let mut lengths = Vec::with_capacity(count);
    let mut pos = 0usize;
    for _ in 0..count {
        let mut len = prefix + 1;
        for _ in 0..3 {
            len += 1 + byte_at(pos + len)? * scalar;
        }
        if pos + len > data.len() {
            return Err(MalformedKind::SliceOverrun.into());
        }
        if len > u16::MAX as usize {
            return Err(MalformedKind::FragmentTooLarge(len).into());
        }
        lengths.push(len);
        pos += len;
    }

    if pos < data.len() {
        tracing::trace!(trailing = data.len() - pos, "bytes after last slice");
    }

    Ok(lengths)
}

/// A run of consecutive slices sent in one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SliceGroup {
    /// Offset of the first slice within the slice data.
    start: usize,
    len: usize,
    count: u16,
    x: u16,
    y: u16,
}

/// Greedily pack slices so that header plus data stays within `mtu`.
///
/// A slice that alone exceeds the MTU still gets a fragment of its own.
fn pack_slices(params: &TransformParameters, lengths: &[usize], mtu: usize) -> Vec<SliceGroup> {
    let mut groups = Vec::new();
    let mut current: Option<SliceGroup> = None;
    let (mut x, mut y) = (0u16, 0u16);
    let mut pos = 0usize;

    for &len in lengths {
        if let Some(group) = current {
            let overflow = group.len + len + HQ_SLICE_HEADER_SIZE > mtu
                || group.len + len > u16::MAX as usize
                || group.count == u16::MAX;
            if overflow {
                groups.push(group);
                current = None;
            }
        }

        let group = current.get_or_insert(SliceGroup {
            start: pos,
            len: 0,
            count: 0,
            x,
            y,
        });
        group.len += len;
        group.count += 1;
        pos += len;

        x += 1;
        if x as u32 >= params.slices_x {
            x = 0;
            y += 1;
        }
    }

    groups.extend(current);
    groups
}
