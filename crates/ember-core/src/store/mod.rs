//! The keyspace, its value types, and the active expiration background task.

mod expiration;
mod keyspace;
mod value;

pub use expiration::spawn_expiration_loop;
pub use keyspace::{Keyspace, ACTIVE_EXPIRE_SAMPLE_SIZE};
pub use value::Value;
