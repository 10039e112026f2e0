pub mod adapter;
pub mod bitstream;
pub mod error;
pub mod parse_info;
pub mod rtp;
pub mod shared;

pub use error::{MalformedKind, Result, Vc2Error};
pub use parse_info::{ParseCode, ParseInfo, ParseUnits};
pub use rtp::{
    Depayloader, Fragment, FragmentSink, Payloader, PayloaderConfig, RtpDepacketizer,
    RtpPacketizer,
};
pub use shared::{SharedDepayloader, SharedPayloader};
