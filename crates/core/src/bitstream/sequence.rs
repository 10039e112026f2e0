use super::vlc::BitReader;
use crate::error::{MalformedKind, Result};

/// Frame geometry of a VC2 base video format preset (SMPTE ST 2042-1 Annex C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseVideoFormat {
    pub frame_width: u32,
    pub frame_height: u32,
    pub interlaced: bool,
}

const fn format(frame_width: u32, frame_height: u32, interlaced: bool) -> BaseVideoFormat {
    BaseVideoFormat {
        frame_width,
        frame_height,
        interlaced,
    }
}

/// Presets indexed by `base_video_format`.
pub const BASE_VIDEO_FORMATS: [BaseVideoFormat; 23] = [
    format(640, 480, false),
    format(176, 120, false),
    format(176, 144, false),
    format(352, 240, false),
    format(352, 288, false),
    format(704, 480, false),
    format(704, 576, false),
    format(720, 480, true),
    format(720, 576, true),
    format(1280, 720, false),
    format(1280, 720, false),
    format(1920, 1080, true),
    format(1920, 1080, true),
    format(1920, 1080, false),
    format(1920, 1080, false),
    format(2048, 1080, false),
    format(4096, 2160, false),
    format(3840, 2160, false),
    format(3840, 2160, false),
    format(7680, 4320, false),
    format(7680, 4320, false),
    format(1920, 1080, false),
    format(720, 486, true),
];

pub const SUPPORTED_MAJOR_VERSION: u32 = 2;
pub const HQ_PROFILE: u32 = 3;

/// A decoded VC2 sequence header together with its encoded bytes.
///
/// The raw bytes are what the payloader re-emits, and they are the basis of
/// the cache comparison in [`same_as`](Self::same_as).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    raw: Vec<u8>,
    pub picture_width: u32,
    /// Height of one coded picture: half the frame height when interlaced.
    pub picture_height: u32,
    pub interlaced: bool,
}

impl SequenceHeader {
    /// Decode the payload of a sequence-header parse unit (the bytes after
    /// its 13-byte parse-info header).
    ///
    /// Only HQ profile streams of major version 2 are accepted. Every
    /// optional override block is walked for bit-position correctness; only
    /// custom frame dimensions and the picture coding mode are kept.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = BitReader::new(data);

        let major_version = r.read_uint();
        let _minor_version = r.read_uint();
        let profile = r.read_uint();
        let _level = r.read_uint();

        if major_version != SUPPORTED_MAJOR_VERSION {
            return Err(MalformedKind::UnsupportedVersion(major_version).into());
        }
        if profile != HQ_PROFILE {
            return Err(MalformedKind::UnsupportedProfile(profile).into());
        }

        let index = r.read_uint();
        let base = BASE_VIDEO_FORMATS
            .get(index as usize)
            .copied()
            .ok_or(MalformedKind::UnknownVideoFormat(index))?;
        let mut frame_width = base.frame_width;
        let mut frame_height = base.frame_height;

        // frame_size
        if r.read_bool() {
            frame_width = r.read_uint();
            frame_height = r.read_uint();
        }

        // color_diff_sampling_format
        if r.read_bool() {
            r.read_uint();
        }

        // scan_format (superseded by picture_coding_mode below)
        if r.read_bool() {
            r.read_uint();
        }

        // frame_rate: index 0 carries numerator and denominator
        if r.read_bool() && r.read_uint() == 0 {
            r.read_uint();
            r.read_uint();
        }

        // pixel_aspect_ratio: index 0 carries numerator and denominator
        if r.read_bool() && r.read_uint() == 0 {
            r.read_uint();
            r.read_uint();
        }

        // clean_area
        if r.read_bool() {
            for _ in 0..4 {
                r.read_uint();
            }
        }

        // signal_range: index 0 carries offsets and excursions
        if r.read_bool() && r.read_uint() == 0 {
            for _ in 0..4 {
                r.read_uint();
            }
        }

        // color_spec: index 0 carries primaries, matrix and transfer function
        if r.read_bool() && r.read_uint() == 0 {
            for _ in 0..3 {
                if r.read_bool() {
                    r.read_uint();
                }
            }
        }

        let picture_coding_mode = r.read_uint();
        let interlaced = picture_coding_mode != 0;

        Ok(Self {
            raw: data.to_vec(),
            picture_width: frame_width,
            picture_height: if interlaced {
                frame_height / 2
            } else {
                frame_height
            },
            interlaced,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Whether `data` encodes the same header as this one.
    ///
    /// Compares the common byte prefix of the two encodings, so trailing
    /// padding on either side does not force a re-cache.
    pub fn same_as(&self, data: &[u8]) -> bool {
        let n = self.raw.len().min(data.len());
        self.raw[..n] == data[..n]
    }
}
