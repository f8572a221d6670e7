//! Per-thread quarantine of zombie-released blocks.
//!
//! Parked blocks stay mapped and poisoned until the thread's quarantine byte
//! budget forces the oldest ones out, at which point they are returned to the
//! system allocator. The quarantine drains itself on thread exit.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::block;

/// Upper bound on bytes (headers included) a single thread keeps parked.
const QUARANTINE_BUDGET: usize = 1 << 20;

struct Parked {
    header: *mut u8,
    total_size: usize,
}

struct Quarantine {
    parked: VecDeque<Parked>,
    bytes: usize,
}

impl Quarantine {
    const fn new() -> Quarantine {
        Quarantine {
            parked: VecDeque::new(),
            bytes: 0,
        }
    }

    fn park(&mut self, header: *mut u8, total_size: usize) {
        self.parked.push_back(Parked { header, total_size });
        self.bytes += total_size;
        while self.bytes > QUARANTINE_BUDGET {
            let Some(oldest) = self.parked.pop_front() else {
                break;
            };
            self.bytes -= oldest.total_size;
            unsafe { block::release_zombie(oldest.header, oldest.total_size) };
        }
    }

    fn purge(&mut self) {
        while let Some(parked) = self.parked.pop_front() {
            unsafe { block::release_zombie(parked.header, parked.total_size) };
        }
        self.bytes = 0;
    }
}

impl Drop for Quarantine {
    fn drop(&mut self) {
        self.purge();
    }
}

thread_local! {
    static QUARANTINE: RefCell<Quarantine> = const { RefCell::new(Quarantine::new()) };
}

pub(crate) fn park(header: *mut u8, total_size: usize) {
    QUARANTINE.with(|q| q.borrow_mut().park(header, total_size));
}

/// Immediately frees every block parked in the current thread's quarantine.
///
/// After this call, any pointer into a previously quarantined block is truly
/// dangling. Intended for tests and for bounding memory in teardown paths.
pub fn purge_quarantine() {
    QUARANTINE.with(|q| q.borrow_mut().purge());
}

/// Total bytes currently parked in the calling thread's quarantine.
pub fn quarantined_bytes() -> usize {
    QUARANTINE.with(|q| q.borrow().bytes)
}
