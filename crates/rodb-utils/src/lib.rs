//! Foundation utilities for the rodb read-only object database.
//!
//! This crate provides the narrow filesystem capability trait the rest of
//! the workspace routes its disk access through, cooperative cancellation,
//! a bounded parallel scope, and a fixed-class buffer pool.

pub mod cancel;
pub mod fs;
pub mod pool;
pub mod scope;

pub use cancel::{CancelToken, Cancelled};
pub use fs::{FileRead, Fs, MemFs, StdFs, TempFile};
pub use pool::{BufferPool, PooledBuf};
pub use scope::{Scope, ScopeError};
