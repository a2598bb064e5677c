//! Process-wide allocator instance.
//!
//! One caching allocator per process, initialized at first install with the
//! backends the embedding layer provides. The core only ever exposes this
//! setter; it never depends on a concrete embedder.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::backend::{EventBackend, RawDeviceAllocator};
use crate::caching::CachingAllocator;

static INSTANCE: OnceCell<CachingAllocator> = OnceCell::new();

/// Install the process-wide allocator. The first installation wins; returns
/// whether this call performed it.
pub fn install(raw: Arc<dyn RawDeviceAllocator>, events: Arc<dyn EventBackend>) -> bool {
    INSTANCE.set(CachingAllocator::new(raw, events)).is_ok()
}

/// The process-wide allocator, if one has been installed.
pub fn instance() -> Option<&'static CachingAllocator> {
    INSTANCE.get()
}

/// Tear-down primitive: return all unsplit cached memory to the raw
/// allocator.
pub fn empty_cache() {
    if let Some(allocator) = INSTANCE.get() {
        allocator.empty_cache();
    }
}
