//! Pool of reusable transmit soft-bit buffers, sized by PRB count and
//! issued to HARQ processes for the lifetime of a transmission.
//!
//! Modeled as an explicit collaborator (injected, not ambient/global state),
//! per the ownership guidance in spec §9: the scheduler constructs one pool
//! per cell and hands handles to HARQ processes and to the RAR/SI
//! schedulers, which hold them for as long as the underlying transmission is
//! in flight.

use std::sync::{Arc, Mutex};

/// A soft-bit buffer sized for up to `max_prb` PRBs worth of a transport
/// block. Content is opaque to the scheduler; only capacity matters here.
#[derive(Debug)]
pub struct SoftBuffer {
    capacity_prb: u32,
}

impl SoftBuffer {
    pub fn capacity_prb(&self) -> u32 {
        self.capacity_prb
    }
}

/// Move-only handle to a pooled softbuffer; returns the buffer to the pool
/// on drop so a stuck/acked HARQ process releases it automatically.
pub struct SoftBufferHandle {
    buffer: Option<SoftBuffer>,
    pool: Arc<Mutex<Vec<SoftBuffer>>>,
}

impl std::fmt::Debug for SoftBufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftBufferHandle").field("buffer", &self.buffer).finish()
    }
}

impl Drop for SoftBufferHandle {
    fn drop(&mut self) {
        if let Some(buf) = self.buffer.take() {
            if let Ok(mut free) = self.pool.lock() {
                free.push(buf);
            }
        }
    }
}

/// Internally synchronized pool of [`SoftBuffer`]s. Cheap to clone (an
/// `Arc` around the free-list mutex); every HARQ entity in a cell shares one
/// pool instance.
#[derive(Clone)]
pub struct SoftbufferPool {
    free: Arc<Mutex<Vec<SoftBuffer>>>,
    max_prb: u32,
}

impl SoftbufferPool {
    pub fn new(max_prb: u32) -> Self {
        Self { free: Arc::new(Mutex::new(Vec::new())), max_prb }
    }

    /// Pre-populate the pool with `n` buffers sized for `max_prb`, avoiding
    /// allocation churn once the scheduler is running steady-state.
    pub fn init_pool(&self, n: usize) {
        let mut free = self.free.lock().expect("softbuffer pool mutex poisoned");
        for _ in 0..n {
            free.push(SoftBuffer { capacity_prb: self.max_prb });
        }
    }

    /// Obtain a transmit softbuffer handle, reusing a pooled buffer if one
    /// is free.
    pub fn get_tx(&self) -> SoftBufferHandle {
        let mut free = self.free.lock().expect("softbuffer pool mutex poisoned");
        let buffer = free.pop().unwrap_or(SoftBuffer { capacity_prb: self.max_prb });
        SoftBufferHandle { buffer: Some(buffer), pool: self.free.clone() }
    }

    pub fn nof_free(&self) -> usize {
        self.free.lock().expect("softbuffer pool mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_returns_buffer_to_pool_on_drop() {
        let pool = SoftbufferPool::new(100);
        pool.init_pool(1);
        assert_eq!(pool.nof_free(), 1);
        let handle = pool.get_tx();
        assert_eq!(pool.nof_free(), 0);
        drop(handle);
        assert_eq!(pool.nof_free(), 1);
    }

    #[test]
    fn pool_grows_beyond_preallocation() {
        let pool = SoftbufferPool::new(100);
        let _a = pool.get_tx();
        let _b = pool.get_tx();
        assert_eq!(pool.nof_free(), 0);
    }
}
