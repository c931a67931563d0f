use bitvec::prelude::{BitVec, Lsb0};

use crate::key::{BucketId, PRIMARY_BUCKET};
use crate::{OffscreenAllocError, OffscreenFreeError};

/// A successful allocation: `size` bytes starting `base` bytes into the surface memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenBlock {
    pub base: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketInfo {
    pub base: usize,
    pub size: usize,
    pub used: bool,
}

#[derive(Debug, Clone, Copy)]
struct BucketNode {
    base: usize,
    size: usize,
    prev: Option<BucketId>,
    next: Option<BucketId>,
}

#[derive(Debug)]
pub struct OffscreenPool {
    // Linked in address order starting at PRIMARY_BUCKET. Slots listed in
    // `vacant` are unlinked and hold stale data.
    nodes: Vec<BucketNode>,
    used: BitVec<usize, Lsb0>,
    dirty: BitVec<usize, Lsb0>,
    vacant: Vec<BucketId>,
    pool_base: usize,
    total_bytes: usize,
    free_bytes: usize,
}

impl OffscreenPool {
    /// Builds a pool of `pool_size` bytes starting at `pool_base`. The bytes
    /// before `pool_base` belong to the primary surface and stay allocated.
    pub fn new(pool_base: usize, pool_size: usize) -> Self {
        let mut pool = Self {
            nodes: vec![BucketNode {
                base: 0,
                size: pool_base,
                prev: None,
                next: None,
            }],
            used: BitVec::repeat(true, 1),
            dirty: BitVec::repeat(false, 1),
            vacant: Vec::new(),
            pool_base,
            total_bytes: pool_size,
            free_bytes: pool_size,
        };
        if pool_size > 0 {
            let first = pool.insert_node(BucketNode {
                base: pool_base,
                size: pool_size,
                prev: Some(PRIMARY_BUCKET),
                next: None,
            });
            pool.node_mut(PRIMARY_BUCKET).next = Some(first);
        }
        pool
    }

    pub fn pool_base(&self) -> usize {
        self.pool_base
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn alloc(&mut self, size: usize) -> Result<OffscreenBlock, OffscreenAllocError> {
        if size == 0 {
            return Err(OffscreenAllocError::ZeroSize);
        }
        if size > self.free_bytes {
            return Err(OffscreenAllocError::OutOfMemory {
                requested: size,
                available: self.free_bytes,
            });
        }

        let Some(id) = self
            .bucket_ids()
            .find(|id| !self.is_used(*id) && self.node(*id).size >= size)
        else {
            return Err(OffscreenAllocError::Fragmented {
                requested: size,
                largest_free: self.largest_free_block(),
            });
        };

        let chosen = *self.node(id);
        let extra = chosen.size - size;
        if extra > 0 {
            let remainder = self.insert_node(BucketNode {
                base: chosen.base + size,
                size: extra,
                prev: Some(id),
                next: chosen.next,
            });
            if let Some(next) = chosen.next {
                self.node_mut(next).prev = Some(remainder);
            }
            self.node_mut(id).next = Some(remainder);
        }

        self.node_mut(id).size = size;
        self.used.set(id.index(), true);
        self.dirty.set(id.index(), false);
        self.free_bytes -= size;
        Ok(OffscreenBlock {
            base: chosen.base,
            size,
        })
    }

    /// Releases the bucket starting at `base` and returns its size.
    pub fn free(&mut self, base: usize) -> Result<usize, OffscreenFreeError> {
        let Some(id) = self.find_bucket(base) else {
            return Err(OffscreenFreeError::UnknownBase(base));
        };
        if id == PRIMARY_BUCKET {
            return Err(OffscreenFreeError::PrimarySurface);
        }
        if !self.is_used(id) {
            return Err(OffscreenFreeError::NotAllocated(base));
        }

        let freed = self.node(id).size;
        self.used.set(id.index(), false);
        self.dirty.set(id.index(), false);
        self.free_bytes += freed;

        if let Some(next) = self.node(id).next {
            if !self.is_used(next) {
                self.merge_into_previous(id, next);
            }
        }
        if let Some(prev) = self.node(id).prev {
            if !self.is_used(prev) {
                self.merge_into_previous(prev, id);
            }
        }
        Ok(freed)
    }

    /// Flags the used bucket at `base` as having pending hardware work.
    pub fn mark_dirty(&mut self, base: usize) -> bool {
        match self.find_bucket(base) {
            Some(id) if self.is_used(id) => {
                self.dirty.set(id.index(), true);
                true
            }
            _ => false,
        }
    }

    pub fn is_dirty(&self, base: usize) -> bool {
        self.find_bucket(base)
            .is_some_and(|id| self.dirty[id.index()])
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.fill(false);
    }

    pub fn largest_free_block(&self) -> usize {
        self.bucket_ids()
            .filter(|id| !self.is_used(*id))
            .map(|id| self.node(id).size)
            .max()
            .unwrap_or(0)
    }

    /// Pool buckets in address order, excluding the primary surface bucket.
    pub fn buckets(&self) -> Vec<BucketInfo> {
        self.bucket_ids()
            .filter(|id| *id != PRIMARY_BUCKET)
            .map(|id| BucketInfo {
                base: self.node(id).base,
                size: self.node(id).size,
                used: self.is_used(id),
            })
            .collect()
    }

    pub fn primary_bucket(&self) -> BucketInfo {
        let node = self.node(PRIMARY_BUCKET);
        BucketInfo {
            base: node.base,
            size: node.size,
            used: true,
        }
    }

    fn bucket_ids(&self) -> impl Iterator<Item = BucketId> + '_ {
        std::iter::successors(Some(PRIMARY_BUCKET), move |id| self.node(*id).next)
    }

    fn find_bucket(&self, base: usize) -> Option<BucketId> {
        // A zero-sized primary bucket shares its base with the first pool bucket.
        self.bucket_ids().find(|id| {
            let node = self.node(*id);
            node.base == base && (*id != PRIMARY_BUCKET || node.size > 0)
        })
    }

    /// Folds `absorbed` into `keeper`, its immediate predecessor, and recycles the slot.
    fn merge_into_previous(&mut self, keeper: BucketId, absorbed: BucketId) {
        let absorbed_node = *self.node(absorbed);
        debug_assert_eq!(absorbed_node.prev, Some(keeper), "merge of non-adjacent buckets");
        let keeper_node = self.node_mut(keeper);
        keeper_node.size += absorbed_node.size;
        keeper_node.next = absorbed_node.next;
        if let Some(after) = absorbed_node.next {
            self.node_mut(after).prev = Some(keeper);
        }
        self.release_node(absorbed);
    }

    fn insert_node(&mut self, node: BucketNode) -> BucketId {
        if let Some(id) = self.vacant.pop() {
            self.nodes[id.index()] = node;
            self.used.set(id.index(), false);
            self.dirty.set(id.index(), false);
            return id;
        }
        let id = BucketId::from_index(self.nodes.len());
        self.nodes.push(node);
        self.used.push(false);
        self.dirty.push(false);
        id
    }

    fn release_node(&mut self, id: BucketId) {
        self.used.set(id.index(), false);
        self.dirty.set(id.index(), false);
        self.vacant.push(id);
    }

    fn is_used(&self, id: BucketId) -> bool {
        self.used[id.index()]
    }

    fn node(&self, id: BucketId) -> &BucketNode {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: BucketId) -> &mut BucketNode {
        &mut self.nodes[id.index()]
    }
}
