use std::sync::Arc;

use tidal_buffer::BufferPool;

/// A small pool sized for unit tests: `capacity` buffers of `buffer_size`
/// bytes each, matching the shape `NodeEngine::start` would build from
/// `EngineConfig`, without pulling in the full engine.
pub fn test_buffer_pool(capacity: usize, buffer_size: usize) -> Arc<BufferPool> {
    Arc::new(BufferPool::new(capacity, buffer_size))
}
