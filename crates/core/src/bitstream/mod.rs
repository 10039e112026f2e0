//! VC2 bitstream grammars needed to find structural boundaries.
//!
//! Only the sequence header and the HQ picture transform parameters are
//! decoded, and only far enough to learn picture geometry and slice layout.
//! Coefficient data is never touched.
//!
//! All grammars sit on [`vlc::BitReader`], which reads MSB-first and
//! decodes the interleaved exp-Golomb codes of SMPTE ST 2042-1 §A.4.

pub mod sequence;
pub mod transform;
pub mod vlc;

pub use sequence::SequenceHeader;
pub use transform::TransformParameters;
pub use vlc::{BitReader, VlcWriter};
