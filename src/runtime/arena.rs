use crate::backend::device::{Backend, DeviceBuffer};
use crate::foundation::core::TensorShape;
use crate::foundation::error::DetectResult;
use std::collections::HashMap;

/// Device buffer holding one run's preprocessed frame.
pub type InputBuffer = DeviceBuffer;

/// Retention limits for [`InputArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ArenaOpts {
    /// Maximum bytes retained across all shape buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained buffers per shape.
    pub max_buffers_per_shape: usize,
}

impl Default for ArenaOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 256 * 1024 * 1024,
            max_buffers_per_shape: 4,
        }
    }
}

/// Arena counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArenaStats {
    /// Buffers currently held for reuse.
    pub retained_buffers: usize,
    /// Bytes currently held for reuse.
    pub retained_bytes: usize,
    /// Buffers obtained from the backend.
    pub alloc_buffers: u64,
    /// Bytes obtained from the backend.
    pub alloc_bytes: u64,
    /// Acquisitions served from the pool.
    pub reused: u64,
    /// Releases that freed the buffer instead of retaining it.
    pub dropped_on_release: u64,
}

struct Bucket {
    buffers: Vec<InputBuffer>,
}

/// Bounded pool of input buffers keyed by shape.
///
/// Not internally locked: at most one run holds a buffer at a time, so acquire/release are
/// strictly sequential.
pub struct InputArena {
    opts: ArenaOpts,
    stats: ArenaStats,

    bucket_idx_by_shape: HashMap<TensorShape, usize>,
    buckets: Vec<Bucket>,
}

impl InputArena {
    /// Create an empty arena.
    pub fn new(opts: ArenaOpts) -> Self {
        Self {
            opts,
            stats: ArenaStats::default(),
            bucket_idx_by_shape: HashMap::new(),
            buckets: Vec::new(),
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ArenaStats {
        self.stats.clone()
    }

    /// Hand out a buffer of `shape`, reusing a retained one before allocating.
    ///
    /// Fails with an allocation error when the backend is out of memory.
    pub fn acquire_input<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        shape: &TensorShape,
    ) -> DetectResult<InputBuffer> {
        if let Some(&bi) = self.bucket_idx_by_shape.get(shape)
            && let Some(buf) = self.buckets[bi].buffers.pop()
        {
            self.stats.retained_buffers = self.stats.retained_buffers.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(buf.byte_len());
            self.stats.reused = self.stats.reused.saturating_add(1);
            tracing::trace!(id = buf.id().0, %shape, "input buffer reused");
            return Ok(buf);
        }

        let buf = backend.allocate(shape)?;
        self.stats.alloc_buffers = self.stats.alloc_buffers.saturating_add(1);
        self.stats.alloc_bytes = self.stats.alloc_bytes.saturating_add(buf.byte_len() as u64);
        tracing::trace!(id = buf.id().0, %shape, "input buffer allocated");
        Ok(buf)
    }

    /// Take a buffer back. It is retained for reuse if limits allow, otherwise freed.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B, buffer: InputBuffer) {
        let bytes = buffer.byte_len();
        if self.opts.max_pool_bytes == 0
            || self.opts.max_buffers_per_shape == 0
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.drop_on_release(backend, buffer);
            return;
        }

        let bi = match self.bucket_idx_by_shape.get(buffer.shape()).copied() {
            Some(i) => i,
            None => {
                let i = self.buckets.len();
                self.buckets.push(Bucket {
                    buffers: Vec::new(),
                });
                self.bucket_idx_by_shape.insert(buffer.shape().clone(), i);
                i
            }
        };

        if self.buckets[bi].buffers.len() >= self.opts.max_buffers_per_shape {
            self.drop_on_release(backend, buffer);
            return;
        }

        self.buckets[bi].buffers.push(buffer);
        self.stats.retained_buffers = self.stats.retained_buffers.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }

    /// Free every retained buffer.
    pub fn clear<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for bucket in &mut self.buckets {
            for buf in bucket.buffers.drain(..) {
                backend.free(buf);
            }
        }
        self.stats.retained_buffers = 0;
        self.stats.retained_bytes = 0;
    }

    fn drop_on_release<B: Backend + ?Sized>(&mut self, backend: &mut B, buffer: InputBuffer) {
        self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
        backend.free(buffer);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/arena.rs"]
mod tests;
