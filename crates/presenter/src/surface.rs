//! RAM backing for the logical surface and the off-screen pool behind it.

use std::sync::{Arc, Mutex, MutexGuard};

use offscreen::OffscreenPool;

use crate::ResourceExhaustion;

/// One zero-filled allocation: the primary surface rows followed by the
/// off-screen pool. Pool offsets are byte offsets into the same buffer.
#[derive(Debug)]
pub struct SurfaceMemory {
    bytes: Vec<u8>,
    primary_len: usize,
    pitch: usize,
    pool: OffscreenPool,
}

impl SurfaceMemory {
    pub fn allocate(pitch: usize, rows: usize, pool_bytes: usize) -> Result<Self, ResourceExhaustion> {
        let primary_len = pitch
            .checked_mul(rows)
            .ok_or(ResourceExhaustion::SurfaceMemory {
                requested: usize::MAX,
            })?;
        let total = primary_len
            .checked_add(pool_bytes)
            .ok_or(ResourceExhaustion::SurfaceMemory {
                requested: usize::MAX,
            })?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(total)
            .map_err(|_| ResourceExhaustion::SurfaceMemory { requested: total })?;
        bytes.resize(total, 0);

        Ok(Self {
            bytes,
            primary_len,
            pitch,
            pool: OffscreenPool::new(primary_len, pool_bytes),
        })
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn primary_len(&self) -> usize {
        self.primary_len
    }

    pub fn total_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn primary_pixels(&self) -> &[u8] {
        &self.bytes[..self.primary_len]
    }

    pub fn primary_pixels_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.primary_len]
    }

    pub fn pool(&self) -> &OffscreenPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut OffscreenPool {
        &mut self.pool
    }

    /// Bytes of an off-screen block, or `None` when the range is not inside the pool.
    pub fn block(&self, base: usize, size: usize) -> Option<&[u8]> {
        let range = self.pool_range(base, size)?;
        Some(&self.bytes[range])
    }

    pub fn block_mut(&mut self, base: usize, size: usize) -> Option<&mut [u8]> {
        let range = self.pool_range(base, size)?;
        Some(&mut self.bytes[range])
    }

    /// Waits for outstanding hardware work on the block at `base`. Hardware
    /// updates complete synchronously, so the wait is immediate and only the
    /// busy flags are cleared. Returns whether the block was busy.
    pub fn settle_busy(&mut self, base: usize) -> bool {
        if !self.pool.is_dirty(base) {
            return false;
        }
        self.pool.clear_dirty();
        true
    }

    fn pool_range(&self, base: usize, size: usize) -> Option<std::ops::Range<usize>> {
        let end = base.checked_add(size)?;
        (base >= self.primary_len && end <= self.bytes.len()).then_some(base..end)
    }
}

/// Handle to the surface memory shared between the presenting thread and any
/// thread drawing into secondary surfaces.
#[derive(Debug, Clone)]
pub struct SharedSurface {
    inner: Arc<Mutex<SurfaceMemory>>,
}

impl SharedSurface {
    pub fn new(memory: SurfaceMemory) -> Self {
        Self {
            inner: Arc::new(Mutex::new(memory)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SurfaceMemory> {
        self.inner
            .lock()
            .unwrap_or_else(|_| panic!("surface memory lock poisoned"))
    }

    /// Locks for access to the off-screen block at `base`, first waiting out
    /// any hardware work still marked on it.
    pub fn lock_block(&self, base: usize) -> MutexGuard<'_, SurfaceMemory> {
        let mut memory = self.lock();
        memory.settle_busy(base);
        memory
    }

    pub fn ptr_eq(&self, other: &SharedSurface) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_zeroed_and_pool_starts_after_primary() {
        let memory = SurfaceMemory::allocate(64, 16, 256).expect("allocate");
        assert_eq!(memory.primary_len(), 1024);
        assert_eq!(memory.total_len(), 1280);
        assert!(memory.primary_pixels().iter().all(|byte| *byte == 0));
        assert_eq!(memory.pool().pool_base(), 1024);
        assert_eq!(memory.pool().free_bytes(), 256);
    }

    #[test]
    fn impossible_sizes_report_exhaustion() {
        assert!(matches!(
            SurfaceMemory::allocate(usize::MAX, 2, 0),
            Err(ResourceExhaustion::SurfaceMemory { .. })
        ));
        assert!(matches!(
            SurfaceMemory::allocate(1, 1, usize::MAX),
            Err(ResourceExhaustion::SurfaceMemory { .. })
        ));
    }

    #[test]
    fn blocks_must_lie_inside_the_pool() {
        let mut memory = SurfaceMemory::allocate(16, 16, 64).expect("allocate");
        assert!(memory.block(0, 16).is_none(), "primary rows are not a block");
        assert!(memory.block(256, 65).is_none());
        assert!(memory.block(usize::MAX, 2).is_none());

        memory.block_mut(256, 4).expect("block").copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(memory.block(256, 4), Some(&[1u8, 2, 3, 4][..]));
        assert!(memory.primary_pixels().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn locking_a_busy_block_clears_all_busy_flags() {
        let memory = SurfaceMemory::allocate(16, 16, 128).expect("allocate");
        let shared = SharedSurface::new(memory);
        let (a, b) = {
            let mut memory = shared.lock();
            let a = memory.pool_mut().alloc(32).expect("alloc a");
            let b = memory.pool_mut().alloc(32).expect("alloc b");
            memory.pool_mut().mark_dirty(a.base);
            memory.pool_mut().mark_dirty(b.base);
            (a, b)
        };

        let memory = shared.lock_block(a.base);
        assert!(!memory.pool().is_dirty(a.base));
        assert!(!memory.pool().is_dirty(b.base));
    }

    #[test]
    fn clones_share_one_buffer_across_threads() {
        let shared = SharedSurface::new(SurfaceMemory::allocate(16, 16, 0).expect("allocate"));
        let writer = shared.clone();
        std::thread::spawn(move || {
            writer.lock().primary_pixels_mut()[5] = 0x5a;
        })
        .join()
        .expect("writer thread");
        assert_eq!(shared.lock().primary_pixels()[5], 0x5a);
        assert!(shared.ptr_eq(&shared.clone()));
    }
}
