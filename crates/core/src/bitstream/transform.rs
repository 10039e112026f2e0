use super::vlc::BitReader;
use crate::error::{MalformedKind, Result};

/// Transform parameters at the head of an HQ picture (after its picture number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParameters {
    pub wavelet_index: u32,
    pub dwt_depth: u32,
    pub slices_x: u32,
    pub slices_y: u32,
    pub slice_prefix_bytes: u32,
    pub slice_size_scalar: u32,
    /// Bytes occupied by this block; slice data starts right after it.
    pub coded_size: usize,
}

impl TransformParameters {
    /// Decode the transform parameters, skipping any custom quantisation matrix.
    ///
    /// Fails when the grammar runs off the end of `data`, which means the
    /// picture header is truncated or corrupt.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = BitReader::new(data);

        let wavelet_index = r.read_uint();
        let dwt_depth = r.read_uint();
        let slices_x = r.read_uint();
        let slices_y = r.read_uint();
        let slice_prefix_bytes = r.read_uint();
        let slice_size_scalar = r.read_uint();

        if r.read_bool() {
            r.read_uint();
            for _ in 1..dwt_depth {
                if r.overrun() {
                    break;
                }
                r.read_uint();
                r.read_uint();
                r.read_uint();
            }
        }

        let coded_size = r.length();
        if r.overrun() {
            return Err(MalformedKind::VlcOverrun.into());
        }

        Ok(Self {
            wavelet_index,
            dwt_depth,
            slices_x,
            slices_y,
            slice_prefix_bytes,
            slice_size_scalar,
            coded_size,
        })
    }

    pub fn slice_count(&self) -> u64 {
        self.slices_x as u64 * self.slices_y as u64
    }
}
