use snafu::Snafu;

use crate::backend::{DeviceId, DevicePtr};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Render a byte count the way the OOM diagnostic wants it.
pub(crate) fn format_size(size: u64) -> String {
    if size <= 1024 {
        format!("{size} bytes")
    } else if size <= 1024 * 1024 {
        format!("{:.2} KiB", size as f64 / 1024.0)
    } else if size <= 1024 * 1024 * 1024 {
        format!("{:.2} MiB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GiB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The device ran out of memory even after evicting the cache.
    ///
    /// `allocated` counts memory handed out through this allocator;
    /// `cached` is held by the allocator but unused by the program. The sum
    /// of allocated, free and cached may fall short of the total because the
    /// driver and other programs hold memory too.
    #[snafu(display(
        "out of memory: tried to allocate {} (device {device}; {} total capacity; {} already allocated; {} free; {} cached)",
        format_size(*requested),
        format_size(*total),
        format_size(*allocated),
        format_size(*free),
        format_size(*cached),
    ))]
    OutOfMemory { requested: u64, device: DeviceId, total: u64, allocated: u64, free: u64, cached: u64 },

    /// The pointer was not produced by this allocator (or was already freed).
    #[snafu(display("invalid device pointer: {ptr}"))]
    InvalidPointer { ptr: DevicePtr },

    /// The underlying allocator failed for a reason other than memory.
    #[snafu(display("device allocator backend error: {message}"))]
    Backend { message: String },
}
