// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reusable byte buffers for output pumping and file transfers.
//!
//! Buffers come in two tiers. Dropping a [`PooledBuffer`] returns it to the
//! tier it came from, up to [`MAX_POOL_SIZE`] buffers per tier.

use std::sync::{Arc, Mutex, OnceLock};

/// Buffer size for reading command output from local processes.
pub const OUTPUT_BUFFER_SIZE: usize = 8192;

/// Chunk size for uploads and downloads. Transfer memory is bounded by it.
pub const TRANSFER_CHUNK_SIZE: usize = 65536;

/// Maximum number of idle buffers kept per tier.
pub const MAX_POOL_SIZE: usize = 16;

type Tier = Arc<Mutex<Vec<Vec<u8>>>>;

/// A buffer that returns to its pool when dropped.
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Tier,
}

impl PooledBuffer {
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Resize to `new_len`, filling new bytes with `value`.
    pub fn resize(&mut self, new_len: usize, value: u8) {
        self.buffer.resize(new_len, value);
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.buffer.clear();

        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < MAX_POOL_SIZE {
                pool.push(std::mem::take(&mut self.buffer));
            }
        }
    }
}

/// Thread-safe pool with an output tier and a transfer tier.
pub struct BufferPool {
    output_buffers: Tier,
    transfer_buffers: Tier,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            output_buffers: Arc::new(Mutex::new(Vec::new())),
            transfer_buffers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// An empty buffer with at least [`OUTPUT_BUFFER_SIZE`] capacity.
    pub fn get_output_buffer(&self) -> PooledBuffer {
        Self::take(&self.output_buffers, OUTPUT_BUFFER_SIZE)
    }

    /// An empty buffer with at least [`TRANSFER_CHUNK_SIZE`] capacity.
    pub fn get_transfer_buffer(&self) -> PooledBuffer {
        Self::take(&self.transfer_buffers, TRANSFER_CHUNK_SIZE)
    }

    fn take(pool: &Tier, default_capacity: usize) -> PooledBuffer {
        let buffer = match pool.lock() {
            Ok(mut idle) => idle
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(default_capacity)),
            Err(_) => Vec::with_capacity(default_capacity),
        };

        PooledBuffer {
            buffer,
            pool: Arc::clone(pool),
        }
    }

    pub fn stats(&self) -> BufferPoolStats {
        let count = |tier: &Tier| tier.lock().map(|p| p.len()).unwrap_or(0);
        BufferPoolStats {
            output_buffers_pooled: count(&self.output_buffers),
            transfer_buffers_pooled: count(&self.transfer_buffers),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of idle buffers per tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub output_buffers_pooled: usize,
    pub transfer_buffers_pooled: usize,
}

static GLOBAL_BUFFER_POOL: OnceLock<BufferPool> = OnceLock::new();

/// The process-wide pool shared by all transports and backends.
pub fn global_buffer_pool() -> &'static BufferPool {
    GLOBAL_BUFFER_POOL.get_or_init(BufferPool::new)
}

/// Shorthands for the global pool.
pub mod global {
    use super::*;

    pub fn get_output_buffer() -> PooledBuffer {
        global_buffer_pool().get_output_buffer()
    }

    pub fn get_transfer_buffer() -> PooledBuffer {
        global_buffer_pool().get_transfer_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_cleared_and_reused() {
        let pool = BufferPool::new();

        {
            let mut buffer = pool.get_output_buffer();
            buffer.as_mut_vec().extend_from_slice(b"hello");
            assert_eq!(buffer.as_slice(), b"hello");
        }

        let buffer = pool.get_output_buffer();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= OUTPUT_BUFFER_SIZE);
        assert_eq!(pool.stats().output_buffers_pooled, 0);
    }

    #[test]
    fn test_tiers_are_separate() {
        let pool = BufferPool::new();
        drop(pool.get_transfer_buffer());

        assert_eq!(
            pool.stats(),
            BufferPoolStats {
                output_buffers_pooled: 0,
                transfer_buffers_pooled: 1,
            }
        );
    }

    #[test]
    fn test_pool_size_is_bounded() {
        let pool = BufferPool::new();
        let buffers: Vec<_> = (0..MAX_POOL_SIZE + 4)
            .map(|_| pool.get_transfer_buffer())
            .collect();
        drop(buffers);

        assert_eq!(pool.stats().transfer_buffers_pooled, MAX_POOL_SIZE);
    }

    #[test]
    fn test_resized_transfer_buffer_is_a_full_chunk() {
        let mut buffer = global::get_transfer_buffer();
        buffer.resize(TRANSFER_CHUNK_SIZE, 0);
        assert_eq!(buffer.as_mut_slice().len(), TRANSFER_CHUNK_SIZE);
    }
}
