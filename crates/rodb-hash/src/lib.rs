//! Object identity for the rodb read-only object database.
//!
//! This crate provides the core `ObjectId` type, hex encoding/decoding, the
//! pack-index fan-out table, and streaming hash computation used by tests
//! and fixtures to verify reconstructed objects.

mod error;
pub mod fanout;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use oid::ObjectId;
