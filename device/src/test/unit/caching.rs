use std::sync::Arc;

use crate::backend::{ImmediateEvents, Stream};
use crate::caching::CachingAllocator;
use crate::error::Error;
use crate::test::support::FakeDevice;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

fn allocator(capacity: u64) -> (CachingAllocator, Arc<FakeDevice>) {
    let raw = FakeDevice::new(capacity);
    let allocator = CachingAllocator::new(raw.clone(), Arc::new(ImmediateEvents::new()));
    (allocator, raw)
}

#[test]
fn test_rounding_policy() {
    let (a, _raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    // Below 512 rounds to 512; below 1 MiB to 512-multiples; above to
    // 128 KiB multiples. The stat counts the rounded block size.
    for (requested, rounded) in [(1, 512), (512, 512), (1000, 1024), (MIB, MIB), (MIB + 1, MIB + 128 * KIB)] {
        let before = a.device_stats(0).amount_allocated;
        let ptr = a.alloc(requested, stream).unwrap();
        assert_eq!(a.device_stats(0).amount_allocated - before, rounded, "request of {requested}");
        a.free(ptr).unwrap();
    }
}

#[test]
fn test_small_requests_carve_one_slab() {
    let (a, raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    // Four small allocations fit in the single 1 MiB slab.
    let ptrs: Vec<_> = (0..4).map(|_| a.alloc(100 * KIB, stream).unwrap()).collect();
    assert_eq!(raw.mallocs(), 1);
    assert_eq!(a.device_stats(0).amount_cached, MIB);

    for ptr in ptrs {
        a.free(ptr).unwrap();
    }
    a.check_chains();
    // Everything coalesces back into one cached slab.
    let census = a.pool_census();
    assert_eq!(census.free_bytes, MIB);
    assert_eq!(census.small_blocks, 1);
}

#[test]
fn test_free_reuses_same_stream_block() {
    let (a, raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    let ptr = a.alloc(4 * KIB, stream).unwrap();
    a.free(ptr).unwrap();
    let again = a.alloc(4 * KIB, stream).unwrap();
    assert_eq!(ptr, again, "freed block serves the next same-stream fit");
    assert_eq!(raw.mallocs(), 1);
}

#[test]
fn test_freed_block_does_not_serve_other_streams() {
    let (a, raw) = allocator(64 * MIB);
    let s1 = Stream::new(0, 1);
    let s2 = Stream::new(0, 2);

    let ptr = a.alloc(2 * MIB, s1).unwrap();
    a.free(ptr).unwrap();
    let other = a.alloc(2 * MIB, s2).unwrap();
    assert_ne!(ptr, other, "cached blocks only serve their allocation stream");
    assert_eq!(raw.mallocs(), 2);
}

#[test]
fn test_split_and_coalesce_round_trip() {
    let (a, raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    // Cache a 2 MiB block.
    let big = a.alloc(2 * MIB, stream).unwrap();
    a.free(big).unwrap();
    assert_eq!(raw.mallocs(), 1);

    // A 512 KiB request splits it rather than touching the raw allocator.
    let small = a.alloc(512 * KIB, stream).unwrap();
    assert_eq!(raw.mallocs(), 1, "the cached large block is split, not a fresh slab");
    assert_eq!(small, big, "the head of the split chain serves the request");

    let census = a.pool_census();
    assert_eq!(census.large_blocks, 1);
    assert_eq!(census.free_bytes, 2 * MIB - 512 * KIB, "the residual sits in the large pool");
    a.check_chains();

    // Freeing the head coalesces the chain back into one 2 MiB block.
    a.free(small).unwrap();
    let census = a.pool_census();
    assert_eq!(census.free_bytes, 2 * MIB);
    assert_eq!(census.large_blocks, 1);
    assert_eq!(census.small_blocks, 0);
    a.check_chains();
}

#[test]
fn test_get_base_allocation_walks_the_chain() {
    let (a, _raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    let first = a.alloc(100 * KIB, stream).unwrap();
    let second = a.alloc(100 * KIB, stream).unwrap();

    let (base, size) = a.get_base_allocation(second).unwrap();
    assert_eq!(base, first, "both live in the same 1 MiB slab");
    assert_eq!(size, MIB);
}

#[test]
fn test_alloc_free_restores_allocated_stat() {
    let (a, _raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);
    let before = a.device_stats(0).amount_allocated;

    let ptr = a.alloc(3 * MIB, stream).unwrap();
    a.free(ptr).unwrap();
    assert_eq!(a.device_stats(0).amount_allocated, before);
    assert!(a.device_stats(0).max_amount_allocated >= 3 * MIB);
}

#[test]
fn test_conservation_at_quiescence() {
    let (a, _raw) = allocator(64 * MIB);
    let s = Stream::default_for(0);

    let p1 = a.alloc(64 * KIB, s).unwrap();
    let _p2 = a.alloc(300 * KIB, s).unwrap();
    let p3 = a.alloc(5 * MIB, s).unwrap();
    a.free(p1).unwrap();
    a.free(p3).unwrap();

    let census = a.pool_census();
    let cached = a.device_stats(0).amount_cached;
    assert_eq!(census.free_bytes + census.allocated_bytes + census.pending_bytes, cached);
    a.check_chains();
}

#[test]
fn test_empty_cache_returns_memory() {
    let (a, raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    let ptr = a.alloc(2 * MIB, stream).unwrap();
    a.free(ptr).unwrap();
    assert_eq!(raw.used_bytes(0), 2 * MIB);

    a.empty_cache();
    assert_eq!(raw.used_bytes(0), 0);
    assert_eq!(a.device_stats(0).amount_cached, 0);
    assert_eq!(a.pool_census().free_bytes, 0);
}

#[test]
fn test_empty_cache_keeps_split_blocks() {
    let (a, raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    // The slab is split: one half in use, one half cached.
    let held = a.alloc(100 * KIB, stream).unwrap();
    a.empty_cache();
    assert_eq!(raw.used_bytes(0), MIB, "split remainders stay cached while a sibling is in use");
    assert!(a.pool_census().free_bytes > 0);
    a.free(held).unwrap();
}

#[test]
fn test_cache_info_totals_and_largest() {
    let (a, _raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);

    let p1 = a.alloc(2 * MIB, stream).unwrap();
    let p2 = a.alloc(4 * MIB, stream).unwrap();
    a.free(p1).unwrap();
    a.free(p2).unwrap();

    let (total, largest) = a.cache_info(0);
    assert_eq!(total, 6 * MIB);
    assert_eq!(largest, 4 * MIB);
    assert_eq!(a.cache_info(1), (0, 0));
}

#[test]
fn test_invalid_pointers_are_rejected() {
    let (a, _raw) = allocator(64 * MIB);
    let stream = Stream::default_for(0);
    let bogus = crate::backend::DevicePtr(0xdead);

    assert!(matches!(a.free(bogus), Err(Error::InvalidPointer { .. })));
    assert!(matches!(a.record_stream(bogus, stream), Err(Error::InvalidPointer { .. })));
    assert!(matches!(a.get_base_allocation(bogus), Err(Error::InvalidPointer { .. })));

    // Double free is an invalid pointer too.
    let ptr = a.alloc(KIB, stream).unwrap();
    a.free(ptr).unwrap();
    assert!(matches!(a.free(ptr), Err(Error::InvalidPointer { .. })));
}

#[test]
fn test_per_device_stats_are_lazy_and_separate() {
    let (a, _raw) = allocator(64 * MIB);
    let p0 = a.alloc(MIB, Stream::default_for(0)).unwrap();
    let _p1 = a.alloc(2 * MIB, Stream::default_for(1)).unwrap();

    assert_eq!(a.device_stats(0).amount_allocated, MIB);
    assert_eq!(a.device_stats(1).amount_allocated, 2 * MIB);
    assert_eq!(a.device_stats(7).amount_allocated, 0);

    a.free(p0).unwrap();
    assert_eq!(a.device_stats(0).amount_allocated, 0);
    assert_eq!(a.device_stats(1).amount_allocated, 2 * MIB);
}
