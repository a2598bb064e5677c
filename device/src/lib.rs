//! Device memory layer: a stream-aware caching allocator over an injected
//! raw allocator, with event-deferred cross-stream reuse.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use skein_device::{CachingAllocator, HostAllocator, ImmediateEvents, Stream};
//!
//! let allocator = CachingAllocator::new(Arc::new(HostAllocator::new()), Arc::new(ImmediateEvents::new()));
//! let stream = Stream::default_for(0);
//!
//! let ptr = allocator.alloc(4096, stream).unwrap();
//! allocator.free(ptr).unwrap();
//!
//! // The freed block is cached: the next fit comes from the pool.
//! let again = allocator.alloc(4096, stream).unwrap();
//! assert_eq!(ptr, again);
//! ```

pub mod backend;
pub mod error;

mod caching;
mod global;
mod stats;

pub use backend::{
    DeviceId, DevicePtr, EventBackend, EventId, HostAllocator, ImmediateEvents, RawAllocError, RawDeviceAllocator,
    Stream,
};
pub use caching::CachingAllocator;
pub use error::{Error, Result};
pub use global::{empty_cache, install, instance};
pub use stats::DeviceStats;
