//! Stream-aware caching allocator over a raw device allocator.
//!
//! - Allocations are associated with a stream. Once freed, blocks are
//!   re-allocated on the same stream, but not on any other stream.
//! - The cache hands out the smallest free block that fits; oversized blocks
//!   are split and the remainder linked to the head so neighbors can
//!   coalesce on free. Small requests that miss their own pool may carve a
//!   piece off a cached large block.
//! - If the raw allocator fails, every cached block that is not part of a
//!   split chain is released and the allocation retried once.
//! - Requests of at most 1 MiB are "small": they are padded to 512-byte
//!   multiples and backed by 1 MiB slabs. Larger requests are padded to
//!   128 KiB multiples and backed exactly.
//!
//! Frees and allocations are usages of the memory segment on the block's
//! stream, like kernel launches. [`CachingAllocator::record_stream`] tells
//! the cache about uses on other streams; reuse of such a block is deferred
//! until a completion event recorded on every using stream has fired.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use snafu::OptionExt;

use crate::backend::{DeviceId, DevicePtr, EventBackend, EventId, RawAllocError, RawDeviceAllocator, Stream};
use crate::error::{BackendSnafu, Error, InvalidPointerSnafu, Result};
use crate::stats::DeviceStats;

/// Small allocations round up to 512-byte multiples.
const ROUND_SMALL: u64 = 512;
/// Large allocations round up to 128 KiB multiples.
const ROUND_LARGE: u64 = 128 * 1024;
/// Largest "small" allocation: 1 MiB.
const SMALL_ALLOC: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BlockId(usize);

#[derive(Debug)]
struct Block {
    device: DeviceId,
    /// Allocation stream; freed blocks only serve this stream again.
    stream: Stream,
    /// Streams the program used this allocation on since the last reset.
    stream_uses: BTreeSet<Stream>,
    size: u64,
    ptr: DevicePtr,
    allocated: bool,
    /// Neighbors within a split chain carved from one slab.
    prev: Option<BlockId>,
    next: Option<BlockId>,
    /// Completion events that must fire before the block may be reused.
    event_count: usize,
}

impl Block {
    fn is_split(&self) -> bool {
        self.prev.is_some() || self.next.is_some()
    }
}

/// Free-pool ordering key: `(device, stream, size, ptr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BlockKey {
    device: DeviceId,
    stream: Stream,
    size: u64,
    ptr: u64,
}

#[derive(Debug, Default)]
struct State {
    slots: Vec<Option<Block>>,
    free_slots: Vec<BlockId>,
    /// Cached blocks of at most 1 MiB.
    small_blocks: BTreeMap<BlockKey, BlockId>,
    /// Cached blocks larger than 1 MiB.
    large_blocks: BTreeMap<BlockKey, BlockId>,
    /// In-use blocks by their pointer.
    allocated_blocks: HashMap<DevicePtr, BlockId>,
    /// FIFO of outstanding completion events.
    events: VecDeque<(EventId, BlockId)>,
    /// Lazily created per-device statistics.
    stats: HashMap<DeviceId, DeviceStats>,
}

impl State {
    fn block(&self, id: BlockId) -> &Block {
        self.slots[id.0].as_ref().expect("stale block handle")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.slots[id.0].as_mut().expect("stale block handle")
    }

    fn insert_block(&mut self, block: Block) -> BlockId {
        if let Some(id) = self.free_slots.pop() {
            self.slots[id.0] = Some(block);
            id
        } else {
            self.slots.push(Some(block));
            BlockId(self.slots.len() - 1)
        }
    }

    fn release_slot(&mut self, id: BlockId) {
        self.slots[id.0] = None;
        self.free_slots.push(id);
    }

    fn stats_mut(&mut self, device: DeviceId) -> &mut DeviceStats {
        self.stats.entry(device).or_default()
    }

    fn key_of(&self, id: BlockId) -> BlockKey {
        let b = self.block(id);
        BlockKey { device: b.device, stream: b.stream, size: b.size, ptr: b.ptr.0 }
    }

    fn pool_for(&mut self, size: u64) -> &mut BTreeMap<BlockKey, BlockId> {
        if size <= SMALL_ALLOC { &mut self.small_blocks } else { &mut self.large_blocks }
    }

    /// Smallest cached block on `(device, stream)` with `size >= wanted`.
    fn pool_lookup(pool: &BTreeMap<BlockKey, BlockId>, device: DeviceId, stream: Stream, wanted: u64) -> Option<BlockKey> {
        let probe = BlockKey { device, stream, size: wanted, ptr: 0 };
        match pool.range(probe..).next() {
            Some((key, _)) if key.device == device && key.stream == stream => Some(*key),
            _ => None,
        }
    }

    /// Return a free block to its pool, coalescing with free, event-quiet
    /// neighbors first.
    fn free_block(&mut self, id: BlockId) {
        debug_assert!(!self.block(id).allocated && self.block(id).event_count == 0);
        let prev = self.block(id).prev;
        let next = self.block(id).next;
        self.try_merge_blocks(id, prev);
        self.try_merge_blocks(id, next);
        let key = self.key_of(id);
        self.pool_for(key.size).insert(key, id);
    }

    /// Combine previously split neighbors: fold `src` into `dst`.
    fn try_merge_blocks(&mut self, dst: BlockId, src: Option<BlockId>) {
        let Some(src) = src else { return };
        if self.block(src).allocated || self.block(src).event_count > 0 {
            return;
        }
        // A mergeable neighbor is free, hence pooled.
        let src_key = self.key_of(src);
        self.pool_for(src_key.size).remove(&src_key);

        if self.block(dst).prev == Some(src) {
            let (src_ptr, src_prev) = (self.block(src).ptr, self.block(src).prev);
            let d = self.block_mut(dst);
            d.ptr = src_ptr;
            d.prev = src_prev;
            if let Some(p) = src_prev {
                self.block_mut(p).next = Some(dst);
            }
        } else {
            let src_next = self.block(src).next;
            self.block_mut(dst).next = src_next;
            if let Some(n) = src_next {
                self.block_mut(n).prev = Some(dst);
            }
        }
        let src_size = self.block(src).size;
        self.block_mut(dst).size += src_size;
        self.release_slot(src);
    }

    /// Remove every non-split cached block (optionally one device only),
    /// handing back `(device, ptr, size)` for the caller to release.
    fn take_unsplit_cached(&mut self, device: Option<DeviceId>) -> Vec<(DeviceId, DevicePtr, u64)> {
        let mut victims = Vec::new();
        for pool in [&mut self.small_blocks, &mut self.large_blocks] {
            let keys: Vec<(BlockKey, BlockId)> = pool
                .iter()
                .filter(|(key, _)| device.is_none_or(|d| key.device == d))
                .map(|(k, v)| (*k, *v))
                .collect();
            for (key, id) in keys {
                if !self.slots[id.0].as_ref().expect("pooled block is live").is_split() {
                    pool.remove(&key);
                    victims.push((key.device, DevicePtr(key.ptr), key.size));
                    self.slots[id.0] = None;
                    self.free_slots.push(id);
                }
            }
        }
        for &(device, _, size) in &victims {
            self.stats_mut(device).decrease_cached(size);
        }
        victims
    }
}

/// Round the requested size per the small/large policy.
fn round_size(size: u64) -> u64 {
    if size < ROUND_SMALL {
        ROUND_SMALL
    } else if size < SMALL_ALLOC {
        size + ROUND_SMALL - 1 - (size - 1) % ROUND_SMALL
    } else {
        size + ROUND_LARGE - 1 - (size - 1) % ROUND_LARGE
    }
}

/// The process-facing caching allocator.
///
/// Internally serialized by a primary mutex over all per-device state and a
/// secondary mutex guarding raw-free calls (collective communication
/// libraries also take a device lock around frees). Lock order is primary
/// then secondary; paths that release device memory drop the primary lock
/// before taking the secondary.
pub struct CachingAllocator {
    raw: Arc<dyn RawDeviceAllocator>,
    events: Arc<dyn EventBackend>,
    state: Mutex<State>,
    raw_free_mutex: Mutex<()>,
}

impl std::fmt::Debug for CachingAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingAllocator").finish_non_exhaustive()
    }
}

impl CachingAllocator {
    pub fn new(raw: Arc<dyn RawDeviceAllocator>, events: Arc<dyn EventBackend>) -> Self {
        Self { raw, events, state: Mutex::new(State::default()), raw_free_mutex: Mutex::new(()) }
    }

    /// Allocate a block that is safe to use from `stream`.
    pub fn alloc(&self, size: u64, stream: Stream) -> Result<DevicePtr> {
        let device = stream.device;
        let mut state = self.state.lock();

        self.process_events_locked(&mut state);

        let size = round_size(size);
        let small = size <= SMALL_ALLOC;

        // Best-fit lookup in the matching pool; small requests may also
        // carve a piece off a cached large block.
        let pool_hit = State::pool_lookup(if small { &state.small_blocks } else { &state.large_blocks }, device, stream, size)
            .or_else(|| {
                if small { State::pool_lookup(&state.large_blocks, device, stream, size) } else { None }
            });

        let block_id = if let Some(key) = pool_hit {
            state.pool_for(key.size).remove(&key).expect("pool hit is present")
        } else {
            let alloc_size = if small { SMALL_ALLOC } else { size };
            let ptr = self.raw_malloc_retry(&mut state, device, alloc_size)?;
            state.stats_mut(device).increase_cached(alloc_size);
            tracing::debug!(device, size = alloc_size, "allocated fresh slab from the raw allocator");
            state.insert_block(Block {
                device,
                stream,
                stream_uses: BTreeSet::new(),
                size: alloc_size,
                ptr,
                allocated: false,
                prev: None,
                next: None,
                event_count: 0,
            })
        };

        // Split off the tail when the leftover is worth keeping.
        let remainder_min = if small { ROUND_SMALL } else { SMALL_ALLOC + 1 };
        let block_id = if state.block(block_id).size - size >= remainder_min {
            let remaining = block_id;
            let (ptr, old_prev) = {
                let r = state.block(remaining);
                (r.ptr, r.prev)
            };
            let head = state.insert_block(Block {
                device,
                stream,
                stream_uses: BTreeSet::new(),
                size,
                ptr,
                allocated: false,
                prev: old_prev,
                next: Some(remaining),
                event_count: 0,
            });
            if let Some(p) = old_prev {
                state.block_mut(p).next = Some(head);
            }
            let r = state.block_mut(remaining);
            r.prev = Some(head);
            r.ptr = r.ptr.offset(size);
            r.size -= size;
            let key = state.key_of(remaining);
            state.pool_for(key.size).insert(key, remaining);
            head
        } else {
            block_id
        };

        let block = state.block_mut(block_id);
        block.allocated = true;
        block.stream = stream;
        let (ptr, real_size) = (block.ptr, block.size);
        state.allocated_blocks.insert(ptr, block_id);
        state.stats_mut(device).increase_allocated(real_size);
        Ok(ptr)
    }

    /// Return an allocation. Blocks used on foreign streams go through the
    /// event queue; the rest return to their free pool immediately.
    pub fn free(&self, ptr: DevicePtr) -> Result<()> {
        let mut state = self.state.lock();
        let id = state.allocated_blocks.remove(&ptr).context(InvalidPointerSnafu { ptr })?;

        let block = state.block_mut(id);
        block.allocated = false;
        let (device, size) = (block.device, block.size);
        state.stats_mut(device).decrease_allocated(size);

        if !state.block(id).stream_uses.is_empty() {
            self.insert_events(&mut state, id);
        } else {
            state.free_block(id);
        }
        Ok(())
    }

    /// Note that the allocation behind `ptr` was used on `stream`.
    ///
    /// Uses on the allocation stream need no special synchronization and are
    /// ignored; any other stream triggers event-deferred reuse at free time.
    pub fn record_stream(&self, ptr: DevicePtr, stream: Stream) -> Result<()> {
        let mut state = self.state.lock();
        let id = *state.allocated_blocks.get(&ptr).context(InvalidPointerSnafu { ptr })?;
        if state.block(id).stream == stream {
            return Ok(());
        }
        state.block_mut(id).stream_uses.insert(stream);
        Ok(())
    }

    /// Reclaim blocks whose outstanding completion events have fired.
    ///
    /// Dequeues from the front and stops at the first incomplete event, so
    /// reuse of later blocks may be delayed even if their events completed;
    /// the conservative direction is the safe one.
    pub fn process_events(&self) {
        let mut state = self.state.lock();
        self.process_events_locked(&mut state);
    }

    fn process_events_locked(&self, state: &mut State) {
        while let Some(&(event, id)) = state.events.front() {
            if !self.events.query(event) {
                break;
            }
            self.events.destroy(event);
            state.events.pop_front();
            let block = state.block_mut(id);
            block.event_count -= 1;
            if block.event_count == 0 && !block.allocated {
                state.free_block(id);
            }
        }
    }

    fn insert_events(&self, state: &mut State, id: BlockId) {
        let streams = std::mem::take(&mut state.block_mut(id).stream_uses);
        for stream in streams {
            let event = self.events.record(stream);
            state.block_mut(id).event_count += 1;
            state.events.push_back((event, id));
        }
    }

    /// Raw allocation with one eviction retry on memory exhaustion. Reports
    /// the full shortage diagnostic when the retry also fails.
    fn raw_malloc_retry(
        &self,
        state: &mut parking_lot::MutexGuard<'_, State>,
        device: DeviceId,
        alloc_size: u64,
    ) -> Result<DevicePtr> {
        match self.raw.malloc(device, alloc_size) {
            Ok(ptr) => Ok(ptr),
            Err(RawAllocError::Backend(message)) => BackendSnafu { message }.fail(),
            Err(RawAllocError::OutOfMemory) => {
                // Give every unsplit cached block on this device back to the
                // raw allocator, then retry exactly once.
                let victims = state.take_unsplit_cached(Some(device));
                parking_lot::MutexGuard::unlocked(state, || self.raw_free_all(victims));

                match self.raw.malloc(device, alloc_size) {
                    Ok(ptr) => Ok(ptr),
                    Err(RawAllocError::Backend(message)) => BackendSnafu { message }.fail(),
                    Err(RawAllocError::OutOfMemory) => {
                        let (free, total) = self.raw.mem_get_info(device);
                        let stats = *state.stats_mut(device);
                        Err(Error::OutOfMemory {
                            requested: alloc_size,
                            device,
                            total,
                            allocated: stats.amount_allocated,
                            free,
                            cached: stats.amount_cached.saturating_sub(stats.amount_allocated),
                        })
                    }
                }
            }
        }
    }

    /// Release device memory with the primary lock dropped; the secondary
    /// lock serializes raw frees.
    fn raw_free_all(&self, victims: Vec<(DeviceId, DevicePtr, u64)>) {
        if victims.is_empty() {
            return;
        }
        let _guard = self.raw_free_mutex.lock();
        for (device, ptr, size) in victims {
            tracing::debug!(device, size, "returning cached slab to the raw allocator");
            self.raw.free(device, ptr);
        }
    }

    /// Return every unsplit cached block on every device to the raw
    /// allocator.
    pub fn empty_cache(&self) {
        let victims = {
            let mut state = self.state.lock();
            state.take_unsplit_cached(None)
        };
        self.raw_free_all(victims);
    }

    /// `(total cached bytes, largest cached block)` for a device.
    pub fn cache_info(&self, device: DeviceId) -> (u64, u64) {
        let state = self.state.lock();
        let mut total = 0;
        let mut largest = 0;
        for pool in [&state.small_blocks, &state.large_blocks] {
            for key in pool.keys() {
                if key.device == device {
                    total += key.size;
                    largest = largest.max(key.size);
                }
            }
        }
        (total, largest)
    }

    /// Base pointer and total size of the split chain containing `ptr`.
    pub fn get_base_allocation(&self, ptr: DevicePtr) -> Result<(DevicePtr, u64)> {
        let state = self.state.lock();
        let mut id = *state.allocated_blocks.get(&ptr).context(InvalidPointerSnafu { ptr })?;
        while let Some(prev) = state.block(id).prev {
            id = prev;
        }
        let base = state.block(id).ptr;
        let mut size = 0;
        let mut cur = Some(id);
        while let Some(c) = cur {
            size += state.block(c).size;
            cur = state.block(c).next;
        }
        Ok((base, size))
    }

    /// Snapshot of a device's statistics.
    pub fn device_stats(&self, device: DeviceId) -> DeviceStats {
        let mut state = self.state.lock();
        *state.stats_mut(device)
    }

    // ---------------------------------------------------------------------
    // Test introspection
    // ---------------------------------------------------------------------

    /// Bytes sitting in the free pools, with the largest single block.
    #[cfg(test)]
    pub(crate) fn pool_census(&self) -> PoolCensus {
        let state = self.state.lock();
        let mut census = PoolCensus::default();
        census.small_blocks = state.small_blocks.len();
        census.large_blocks = state.large_blocks.len();
        census.free_bytes = state.small_blocks.keys().chain(state.large_blocks.keys()).map(|k| k.size).sum();
        census.allocated_bytes = state.allocated_blocks.values().map(|&id| state.block(id).size).sum();
        let pending: std::collections::HashSet<BlockId> = state.events.iter().map(|&(_, id)| id).collect();
        census.pending_bytes =
            pending.iter().filter(|&&id| !state.block(id).allocated).map(|&id| state.block(id).size).sum();
        census.pending_events = state.events.len();
        census
    }

    /// Verify split-chain symmetry and per-chain size conservation.
    #[cfg(test)]
    pub(crate) fn check_chains(&self) {
        let state = self.state.lock();
        for (i, slot) in state.slots.iter().enumerate() {
            let Some(block) = slot else { continue };
            if let Some(next) = block.next {
                assert_eq!(state.block(next).prev, Some(BlockId(i)), "split links are symmetric");
                assert_eq!(state.block(next).ptr.0, block.ptr.0 + block.size, "chain is contiguous");
            }
            if let Some(prev) = block.prev {
                assert_eq!(state.block(prev).next, Some(BlockId(i)), "split links are symmetric");
            }
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PoolCensus {
    pub small_blocks: usize,
    pub large_blocks: usize,
    pub free_bytes: u64,
    pub allocated_bytes: u64,
    pub pending_bytes: u64,
    pub pending_events: usize,
}
