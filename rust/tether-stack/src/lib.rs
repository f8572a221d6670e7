//! Current-thread stack bounds introspection.
//!
//! Supplies the single capability the handle layer needs from the platform:
//! whether a given address lives on the calling thread's stack. When the
//! platform cannot answer, everything is reported as heap-resident, which is
//! the conservative, safety-preserving degradation.

use std::cell::Cell;
use std::ops::Range;

#[cfg_attr(target_os = "linux", path = "stack_linux.rs")]
#[cfg_attr(windows, path = "stack_win.rs")]
#[cfg_attr(not(any(target_os = "linux", windows)), path = "stack_fallback.rs")]
mod platform;

thread_local! {
    /// Cached per-thread bounds: `None` = not yet queried,
    /// `Some((0, 0))` = queried and unavailable.
    static BOUNDS: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

/// Returns the calling thread's stack extent as an address range, or `None`
/// if the platform cannot report it. The platform query runs once per thread.
pub fn stack_bounds() -> Option<Range<usize>> {
    let (start, end) = BOUNDS.with(|cell| match cell.get() {
        Some(bounds) => bounds,
        None => {
            let bounds = platform::query_stack_bounds().unwrap_or((0, 0));
            cell.set(Some(bounds));
            bounds
        }
    });
    (start != end).then_some(start..end)
}

/// Reports whether `addr` falls within the calling thread's stack.
///
/// Returns `false` whenever the stack extent is unknown, so callers treat
/// the address as heap-resident and take the always-safe path.
pub fn is_stack_resident(addr: *const ()) -> bool {
    match stack_bounds() {
        Some(bounds) => bounds.contains(&(addr as usize)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(any(target_os = "linux", windows))]
    fn bounds_are_available() {
        let bounds = stack_bounds().expect("stack bounds");
        assert!(bounds.start < bounds.end);
    }

    #[test]
    #[cfg(any(target_os = "linux", windows))]
    fn local_is_stack_resident() {
        let local = 0u64;
        assert!(is_stack_resident(&local as *const u64 as *const ()));
    }

    #[test]
    fn boxed_value_is_not_stack_resident() {
        let boxed = Box::new(0u64);
        assert!(!is_stack_resident(&*boxed as *const u64 as *const ()));
    }

    #[test]
    #[cfg(any(target_os = "linux", windows))]
    fn bounds_are_stable_per_thread() {
        assert_eq!(stack_bounds(), stack_bounds());
        let from_spawned = std::thread::spawn(|| {
            let local = 0u32;
            is_stack_resident(&local as *const u32 as *const ())
        })
        .join()
        .unwrap();
        assert!(from_spawned);
    }
}
