//! Fixed-size pooled [`tidal_types::TupleBuffer`] allocation (§4.1): the
//! process-wide [`BufferPool`] a `NodeEngine` starts up with, and the
//! [`FixedSizeBufferPool`] sub-pools sources and workers reserve out of it so
//! one noisy neighbor can't exhaust everyone else's buffers.

mod core;
mod error;
mod pool;

pub use error::BufferError;
pub use pool::{BufferPool, FixedSizeBufferPool};
