//! Sized block allocation with a "zombie" release discipline.
//!
//! Every block carries a small header in front of its usable region, recording
//! the usable size and the block's lifecycle state. Blocks released through
//! [`zombie_deallocate`] are not returned to the system immediately: their
//! contents are overwritten with a poison pattern and the block is parked in a
//! per-thread quarantine for a while. During that window the memory stays
//! mapped, so a stale read observes poison (and a stale header check observes
//! the zombie state) instead of undefined behavior.
//!
//! The surface is deliberately narrow: allocate/deallocate, the zombie
//! variants, the header prefix size, and pointer-in-block validation.

pub mod block;
mod quarantine;

pub use block::{
    POISON_BYTE, allocate, block_size, deallocate, is_pointer_in_block, is_zombie_block,
    prefix_size, zombie_allocate, zombie_deallocate,
};
pub use quarantine::{purge_quarantine, quarantined_bytes};
