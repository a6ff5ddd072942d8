//! The RESP-style wire protocol: frame types, a streaming codec, and the
//! CRC-64 sink shared with the snapshot codec.

mod crc64;
mod frame;

pub use crc64::{checksum as crc64_checksum, Crc64Writer};
pub use frame::{Frame, FrameCodec};
