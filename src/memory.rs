//! Process-wide memory budget for the writer.
//!
//! The block writer rotates to a new block when the process footprint grows
//! past a configured ceiling. The budget is deliberately process-wide state:
//! one query function and one setter, so an embedding job scheduler can
//! constrain a running conversion from the outside.

use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_MEMORY_LIMIT_MB: f64 = 3.0 * 1024.0;

static MEMORY_LIMIT_MB: AtomicU64 = AtomicU64::new(0);

/// Current memory ceiling in MB.
#[must_use]
pub fn memory_limit_mb() -> f64 {
    let bits = MEMORY_LIMIT_MB.load(Ordering::Relaxed);
    if bits == 0 {
        DEFAULT_MEMORY_LIMIT_MB
    } else {
        f64::from_bits(bits)
    }
}

/// Sets the memory ceiling in MB. Rejects non-positive values.
pub fn set_memory_limit_mb(mb: f64) -> bool {
    if mb > 0.0 {
        MEMORY_LIMIT_MB.store(mb.to_bits(), Ordering::Relaxed);
        true
    } else {
        false
    }
}

/// Estimated virtual memory footprint of this process in MB.
///
/// Read from `/proc/self/statm` where available; elsewhere the caller's
/// own accounting (`tracked_bytes`) stands in.
#[must_use]
pub fn process_memory_mb(tracked_bytes: u64) -> f64 {
    proc_statm_mb().unwrap_or_else(|| tracked_bytes as f64 / (1024.0 * 1024.0))
}

/// Whether another `bytes_needed` can be allocated within the ceiling.
#[must_use]
pub fn can_allocate(tracked_bytes: u64, bytes_needed: u64) -> bool {
    let needed_mb = bytes_needed as f64 / (1024.0 * 1024.0);
    process_memory_mb(tracked_bytes) + needed_mb < memory_limit_mb()
}

#[cfg(target_os = "linux")]
fn proc_statm_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: f64 = statm.split_whitespace().next()?.parse().ok()?;
    // statm reports pages; assume the common 4 KiB page size.
    Some(pages * 4096.0 / (1024.0 * 1024.0))
}

#[cfg(not(target_os = "linux"))]
fn proc_statm_mb() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_three_gigabytes() {
        assert!(memory_limit_mb() >= 3071.0);
    }

    #[test]
    fn setter_rejects_non_positive() {
        assert!(!set_memory_limit_mb(0.0));
        assert!(!set_memory_limit_mb(-5.0));
    }

    #[test]
    fn tracked_fallback_allows_small_allocations() {
        // Even if /proc is unavailable, a few bytes of tracked usage must
        // fit under any sane ceiling.
        assert!(can_allocate(1024, 1024));
    }
}
