//! Interfaces the caching allocator consumes: the raw device allocator and
//! the stream/event primitive. Both are injected by the embedding layer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Device ordinal.
pub type DeviceId = usize;

/// An execution stream on a device. Streams order work; the allocator never
/// inspects them beyond identity and event recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stream {
    pub device: DeviceId,
    pub id: u64,
}

impl Stream {
    pub fn new(device: DeviceId, id: u64) -> Self {
        Self { device, id }
    }

    /// The device's default stream.
    pub fn default_for(device: DeviceId) -> Self {
        Self { device, id: 0 }
    }
}

/// Opaque device memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    pub(crate) fn offset(self, bytes: u64) -> DevicePtr {
        DevicePtr(self.0 + bytes)
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Handle to a recorded completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub u64);

/// Raw allocation failure, distinguished so the cache can evict and retry on
/// memory exhaustion but propagate everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAllocError {
    OutOfMemory,
    Backend(String),
}

/// The underlying device memory allocator.
pub trait RawDeviceAllocator: Send + Sync {
    fn malloc(&self, device: DeviceId, size: u64) -> Result<DevicePtr, RawAllocError>;

    fn free(&self, device: DeviceId, ptr: DevicePtr);

    /// `(free, total)` bytes on the device.
    fn mem_get_info(&self, device: DeviceId) -> (u64, u64);
}

/// Stream completion events.
///
/// `record` creates an event capturing all work submitted to the stream so
/// far; `query` is non-blocking; `destroy` releases the handle.
pub trait EventBackend: Send + Sync {
    fn record(&self, stream: Stream) -> EventId;

    fn query(&self, event: EventId) -> bool;

    fn destroy(&self, event: EventId);
}

/// Host-memory backend: allocates from the process heap and treats every
/// stream as synchronous (events complete immediately).
#[derive(Debug, Default)]
pub struct HostAllocator {
    live: Mutex<HashMap<u64, std::alloc::Layout>>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawDeviceAllocator for HostAllocator {
    fn malloc(&self, _device: DeviceId, size: u64) -> Result<DevicePtr, RawAllocError> {
        let layout = std::alloc::Layout::from_size_align(size.max(1) as usize, 64)
            .map_err(|e| RawAllocError::Backend(e.to_string()))?;
        // SAFETY: the layout has nonzero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(RawAllocError::OutOfMemory);
        }
        self.live.lock().insert(ptr as u64, layout);
        Ok(DevicePtr(ptr as u64))
    }

    fn free(&self, _device: DeviceId, ptr: DevicePtr) {
        if let Some(layout) = self.live.lock().remove(&ptr.0) {
            // SAFETY: the pointer came from `alloc` with this exact layout.
            unsafe { std::alloc::dealloc(ptr.0 as *mut u8, layout) };
        }
    }

    fn mem_get_info(&self, _device: DeviceId) -> (u64, u64) {
        // The host backend has no meaningful device-wide accounting.
        (u64::MAX, u64::MAX)
    }
}

/// Event backend for synchronous hosts: every recorded event is already
/// complete.
#[derive(Debug, Default)]
pub struct ImmediateEvents {
    next: AtomicU64,
}

impl ImmediateEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBackend for ImmediateEvents {
    fn record(&self, _stream: Stream) -> EventId {
        EventId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn query(&self, _event: EventId) -> bool {
        true
    }

    fn destroy(&self, _event: EventId) {}
}
