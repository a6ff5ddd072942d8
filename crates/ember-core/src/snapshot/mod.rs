//! The RDB-compatible snapshot codec.

mod codec;

pub use codec::{read_snapshot, write_snapshot, write_snapshot_blocking};
