use bytes::Bytes;

use crate::error::{Result, Vc2Error};

use super::depay::Depayloader;
use super::header::{RTP_HEADER_SIZE, RtpHeader, RtpPacket};
use super::pay::DEFAULT_MTU;
use super::{CLOCK_RATE, COMMON_HEADER_SIZE, ENCODING_NAME, Fragment, FragmentSink};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Sequence distances at or beyond half the 16-bit space are behind us.
const MAX_FORWARD_GAP: u16 = 0x8000;

/// Default timestamp step for fragments without a pts: one frame at 30 fps.
pub const DEFAULT_TIMESTAMP_INCREMENT: u32 = CLOCK_RATE / 30;

/// Wraps payloader fragments into RTP packets.
///
/// The RTP timestamp follows the fragment `pts` (nanoseconds) on the 90 kHz
/// clock. Fragments without a pts keep the current timestamp, which then
/// advances by [`timestamp_increment`](Self::set_timestamp_increment) after
/// every marker packet.
///
/// Packets collect internally until [`take_packets`](Self::take_packets).
#[derive(Debug)]
pub struct RtpPacketizer {
    header: RtpHeader,
    mtu: usize,
    timestamp_increment: u32,
    packets: Vec<Vec<u8>>,
}

impl RtpPacketizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self::from_header(RtpHeader::new(pt, ssrc))
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::from_header(RtpHeader::with_random_ssrc(pt))
    }

    fn from_header(header: RtpHeader) -> Self {
        Self {
            header,
            mtu: DEFAULT_MTU,
            timestamp_increment: DEFAULT_TIMESTAMP_INCREMENT,
            packets: Vec::new(),
        }
    }

    /// Fragment MTU handed to the payloader, counted after the common header.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    pub fn set_timestamp_increment(&mut self, increment: u32) {
        self.timestamp_increment = increment;
    }

    /// Largest RTP packet this packetizer produces for in-MTU fragments.
    pub fn packet_size(&self) -> usize {
        RTP_HEADER_SIZE + COMMON_HEADER_SIZE + self.mtu
    }

    pub fn codec_name(&self) -> &'static str {
        ENCODING_NAME
    }

    pub fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }

    pub fn payload_type(&self) -> u8 {
        self.header.pt
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    /// SDP media-level attributes.
    pub fn sdp_attributes(&self) -> Vec<String> {
        vec![
            sdp_rtpmap(self.header.pt),
            "a=control:track1".to_string(),
        ]
    }

    pub fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    pub fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }

    /// Packets written since the last call.
    pub fn take_packets(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.packets)
    }
}

impl FragmentSink for RtpPacketizer {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn push(&mut self, fragment: Fragment) -> Result<()> {
        if let Some(pts) = fragment.pts {
            self.header.set_timestamp(pts_to_rtp(pts));
        }

        let hdr = self.header.write(fragment.marker);
        let mut packet = Vec::with_capacity(RTP_HEADER_SIZE + fragment.payload().len());
        packet.extend_from_slice(&hdr);
        packet.extend_from_slice(fragment.payload());

        tracing::trace!(
            seq = u16::from_be_bytes([hdr[2], hdr[3]]),
            ts = self.header.timestamp(),
            marker = fragment.marker,
            bytes = packet.len(),
            "RTP packet"
        );
        self.packets.push(packet);

        if fragment.marker && fragment.pts.is_none() {
            self.header.advance_timestamp(self.timestamp_increment);
        }
        Ok(())
    }
}

/// `a=rtpmap` line for VC2 on payload type `pt`.
pub fn sdp_rtpmap(pt: u8) -> String {
    format!("a=rtpmap:{} {}/{}", pt, ENCODING_NAME, CLOCK_RATE)
}

fn pts_to_rtp(pts: u64) -> u64 {
    (pts as u128 * CLOCK_RATE as u128 / NANOS_PER_SECOND) as u64
}

/// Feeds received RTP packets to a [`Depayloader`].
///
/// A forward gap in RTP sequence numbers, or a change of SSRC, is reported
/// to the depayloader as a discontinuity on the packet that reveals it.
/// Packets at or behind the last sequence number seen are dropped.
#[derive(Debug, Default)]
pub struct RtpDepacketizer {
    depay: Depayloader,
    last: Option<(u32, u16)>,
    lost: u64,
}

impl RtpDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depayloader(&self) -> &Depayloader {
        &self.depay
    }

    /// Packets missing from the sequence so far, as far as can be counted.
    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Parse one RTP packet and hand its payload to the depayloader.
    ///
    /// Returns a completed native parse unit when the packet finished one.
    /// Only an unparseable RTP envelope is an error.
    pub fn process_packet(&mut self, data: &[u8]) -> Result<Option<Bytes>> {
        let packet = RtpPacket::parse(data)?;

        let discont = match self.last {
            None => false,
            Some((ssrc, _)) if ssrc != packet.ssrc => {
                tracing::debug!(
                    old = format_args!("{:#010X}", ssrc),
                    new = format_args!("{:#010X}", packet.ssrc),
                    "SSRC changed"
                );
                true
            }
            Some((_, seq)) => {
                let expected = seq.wrapping_add(1);
                let gap = packet.sequence.wrapping_sub(expected);
                if gap >= MAX_FORWARD_GAP {
                    tracing::debug!(
                        expected,
                        found = packet.sequence,
                        "duplicate or late RTP packet, dropped"
                    );
                    return Ok(None);
                }
                if gap != 0 {
                    tracing::warn!(expected, found = packet.sequence, "RTP sequence gap");
                    self.lost += gap as u64;
                }
                gap != 0
            }
        };
        self.last = Some((packet.ssrc, packet.sequence));

        Ok(self.depay.process(packet.payload, packet.marker, discont))
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.depay.reset();
    }
}

/// Parse the RTP envelope of every packet in `packets` and depayload them
/// in order, collecting the native stream.
pub fn depacketize_all<'a, I>(packets: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut depack = RtpDepacketizer::new();
    let mut out = Vec::new();
    for packet in packets {
        match depack.process_packet(packet) {
            Ok(Some(unit)) => out.extend_from_slice(&unit),
            Ok(None) => {}
            Err(Vc2Error::Rtp(reason)) => tracing::warn!(reason, "skipping packet"),
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}
