//! Error types for the VC2 RTP payloading library.

use std::fmt;

/// Errors that can occur while payloading or depayloading VC2.
///
/// Variants map to the recovery classes of the codec:
///
/// - **Bitstream**: [`Malformed`](Self::Malformed). The unit or fragment is
///   dropped.
/// - **Reassembly**: [`SequenceMismatch`](Self::SequenceMismatch) and
///   [`FragmentLength`](Self::FragmentLength). The in-progress picture is
///   dropped.
/// - **Configuration**: [`InvalidMtu`](Self::InvalidMtu).
/// - **Glue**: [`Io`](Self::Io), [`Rtp`](Self::Rtp).
///
/// The state machines never surface data-path errors to their caller; they
/// log them and resynchronize.
#[derive(Debug, thiserror::Error)]
pub enum Vc2Error {
    /// Underlying I/O error (packet files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parse unit, grammar block or fragment could not be decoded.
    #[error("malformed VC2 data: {kind}")]
    Malformed { kind: MalformedKind },

    /// A slice fragment belongs to a different picture than the one in progress.
    #[error("picture number mismatch: expected {expected}, found {found}")]
    SequenceMismatch { expected: u32, found: u32 },

    /// A fragment declares more data bytes than its payload carries.
    #[error("fragment declares {declared} bytes but only {available} are available")]
    FragmentLength { declared: usize, available: usize },

    /// The MTU cannot hold even the fixed fragment header.
    #[error("MTU {0} is too small for a VC2 HQ fragment")]
    InvalidMtu(usize),

    /// A transport envelope (RTP) could not be parsed.
    #[error("RTP error: {0}")]
    Rtp(&'static str),
}

/// Specific kind of malformed VC2 data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedKind {
    /// Parse-info prefix is not `BBCD`.
    BadMagic,
    /// Fewer bytes than a fixed-size header requires.
    Truncated,
    /// A VLC grammar read past the end of its input.
    VlcOverrun,
    /// Sequence header `major_version` other than 2.
    UnsupportedVersion(u32),
    /// Sequence header `profile` other than 3 (HQ).
    UnsupportedProfile(u32),
    /// `base_video_format` outside the preset table.
    UnknownVideoFormat(u32),
    /// Slice length fields point past the end of the picture.
    SliceOverrun,
    /// A slice or slice grid does not fit the 16-bit fragment header fields.
    FragmentTooLarge(usize),
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "bad parse-info magic"),
            Self::Truncated => write!(f, "truncated header"),
            Self::VlcOverrun => write!(f, "VLC read past end of data"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported major version {}", v),
            Self::UnsupportedProfile(p) => write!(f, "unsupported profile {}", p),
            Self::UnknownVideoFormat(i) => write!(f, "unknown base video format {}", i),
            Self::SliceOverrun => write!(f, "slice data overruns picture"),
            Self::FragmentTooLarge(n) => write!(f, "{} does not fit a fragment header field", n),
        }
    }
}

impl From<MalformedKind> for Vc2Error {
    fn from(kind: MalformedKind) -> Self {
        Self::Malformed { kind }
    }
}

/// Convenience alias for `Result<T, Vc2Error>`.
pub type Result<T> = std::result::Result<T, Vc2Error>;
