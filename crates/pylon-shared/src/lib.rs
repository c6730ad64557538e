//! # pylon-shared
//!
//! Wire protocol and helpers shared by every Pylon crate: the JSON message
//! types exchanged with remote clients, protocol constants, and the small
//! pure functions (checksums, filename sanitization, MIME lookup) both the
//! sending and receiving side of a blob transfer rely on.

pub mod checksum;
pub mod constants;
pub mod error;
pub mod filename;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
