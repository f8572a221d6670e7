//! Per-allocation control block: the registry of soft handles that point
//! into one owned allocation.
//!
//! The control block sits immediately in front of the owned object, inside
//! the same allocator block. It holds three inline registration slots and,
//! once those are exhausted, a lazily allocated overflow region that doubles
//! in capacity as needed. A registration slot is either free (a link in a
//! singly-linked free list) or used (a back-reference to the registration
//! cell of one live soft handle).
//!
//! Registrations are addressed by a plain `u32` index. Indices below
//! [`INLINE_SLOTS`] name inline slots; everything else names
//! `index - INLINE_SLOTS` within the overflow region. Callers store only the
//! index, so every operation re-derives the region from the numeric range.

use std::cell::Cell;
use std::ptr::NonNull;

/// Number of registration slots embedded directly in the control block.
pub(crate) const INLINE_SLOTS: u32 = 3;

/// Sentinel index: a cell carrying this value holds no registration.
pub(crate) const UNREGISTERED: u32 = u32::MAX;

/// Free-list terminator.
const NONE_INDEX: u32 = u32::MAX;

/// Practical cap on simultaneous registrations per allocation (19 bits of
/// index room, matching the headroom reserved for overflow growth).
pub(crate) const MAX_REGISTRATIONS: u32 = 1 << 19;

/// Initial capacity of the overflow region.
const OVERFLOW_INITIAL_CAPACITY: u32 = 8;

/// Registration record backing one registered soft handle.
///
/// The cell is heap-pinned (boxed by its handle), so the control block's
/// back-reference stays valid no matter how the handle itself moves.
/// Owner-side invalidation writes the null state directly into the cell.
#[repr(C)]
pub(crate) struct SoftCell {
    /// Dereferenceable address; null once the owner has died.
    pub target: *mut u8,
    /// Control block of the tracked allocation; null once the owner has died.
    pub block: *mut ControlBlock,
    /// Registration index, or [`UNREGISTERED`].
    pub index: u32,
}

impl SoftCell {
    pub(crate) fn is_live(&self) -> bool {
        !self.target.is_null()
    }
}

/// One registration slot.
#[derive(Clone, Copy)]
pub(crate) enum Slot {
    /// Member of a free list; `next` is the index of the next free slot in
    /// the same region, or [`NONE_INDEX`].
    Free { next: u32 },
    /// Occupied by a registration; `cell` points at the handle's cell.
    Used { cell: NonNull<SoftCell> },
}

/// Growable secondary slot storage, allocated on first demand.
struct OverflowBlock {
    slots: Vec<Slot>,
    free: u32,
}

impl OverflowBlock {
    fn new(capacity: u32) -> Box<OverflowBlock> {
        let mut block = Box::new(OverflowBlock {
            slots: Vec::with_capacity(capacity as usize),
            free: 0,
        });
        block.extend_free_list(0, capacity);
        block
    }

    /// Appends `count` fresh slots starting at `first`, chaining them into a
    /// free list headed at `first`.
    fn extend_free_list(&mut self, first: u32, count: u32) {
        for i in 0..count {
            let next = if i + 1 < count {
                first + i + 1
            } else {
                NONE_INDEX
            };
            self.slots.push(Slot::Free { next });
        }
        self.free = first;
    }

    /// Doubles the region capacity, keeping live slots in place and
    /// rebuilding the free list over the new tail.
    fn grow(&mut self) {
        debug_assert_eq!(self.free, NONE_INDEX);
        let old_capacity = self.slots.len() as u32;
        self.slots.reserve(old_capacity as usize);
        self.extend_free_list(old_capacity, old_capacity);
    }

    fn acquire(&mut self) -> u32 {
        if self.free == NONE_INDEX {
            self.grow();
        }
        let index = self.free;
        match self.slots[index as usize] {
            Slot::Free { next } => self.free = next,
            Slot::Used { .. } => unreachable!("free list head is a used slot"),
        }
        index
    }

    fn release(&mut self, index: u32) {
        debug_assert!(matches!(self.slots[index as usize], Slot::Used { .. }));
        self.slots[index as usize] = Slot::Free { next: self.free };
        self.free = index;
    }
}

/// Fixed-size header placed immediately before every owned object.
///
/// Initialized in place by [`ControlBlock::init`], torn down exactly once by
/// [`ControlBlock::clear`] when the owning handle releases the allocation.
#[repr(C)]
pub(crate) struct ControlBlock {
    inline: [Slot; INLINE_SLOTS as usize],
    /// Head of the inline free list.
    inline_free: u32,
    /// Number of used slots across both regions.
    live: u32,
    /// Overflow region, null until first needed.
    overflow: *mut OverflowBlock,
    /// Usable-region base of the allocation this block governs.
    base: NonNull<u8>,
    /// Outstanding object borrows: n > 0 shared, -1 exclusive.
    borrows: Cell<i32>,
    /// Set once the owner has released the allocation.
    zombie: bool,
}

/// Bytes reserved for the control block in front of the object, rounded up
/// so the object keeps the allocator's alignment. The object address minus
/// this value is always the control block address.
pub(crate) const fn header_size() -> usize {
    std::mem::size_of::<ControlBlock>().next_multiple_of(16)
}

const _: () = assert!(std::mem::align_of::<ControlBlock>() <= 16);

impl ControlBlock {
    /// Initializes a control block in place. Builds the inline free list;
    /// performs no allocation.
    ///
    /// # Safety
    ///
    /// `this` must point at `header_size()` writable bytes, 8-byte aligned.
    pub unsafe fn init(this: *mut ControlBlock, base: NonNull<u8>) {
        unsafe {
            this.write(ControlBlock {
                inline: [
                    Slot::Free { next: 1 },
                    Slot::Free { next: 2 },
                    Slot::Free { next: NONE_INDEX },
                ],
                inline_free: 0,
                live: 0,
                overflow: std::ptr::null_mut(),
                base,
                borrows: Cell::new(0),
                zombie: false,
            });
        }
    }

    /// Registers a cell and returns its slot index: the first free inline
    /// slot when one exists, an overflow slot otherwise.
    pub fn insert(&mut self, cell: NonNull<SoftCell>) -> u32 {
        debug_assert!(!self.zombie, "insert into a released control block");
        assert!(
            self.live < MAX_REGISTRATIONS,
            "soft handle registration cap exceeded"
        );
        self.live += 1;
        if self.inline_free != NONE_INDEX {
            let index = self.inline_free;
            match self.inline[index as usize] {
                Slot::Free { next } => self.inline_free = next,
                Slot::Used { .. } => unreachable!("inline free list head is a used slot"),
            }
            self.inline[index as usize] = Slot::Used { cell };
            return index;
        }
        let overflow = self.overflow_mut();
        let index = overflow.acquire();
        overflow.slots[index as usize] = Slot::Used { cell };
        INLINE_SLOTS + index
    }

    /// Repoints a used slot at a relocated cell, in place. The registration
    /// keeps its index.
    pub fn reset_at(&mut self, index: u32, cell: NonNull<SoftCell>) {
        debug_assert!(!self.zombie, "reset_at on a released control block");
        let slot = self.slot_mut(index);
        debug_assert!(matches!(slot, Slot::Used { .. }), "reset_at on a free slot");
        *slot = Slot::Used { cell };
    }

    /// Returns a used slot to the free list of its region.
    pub fn remove(&mut self, index: u32) {
        debug_assert!(!self.zombie, "remove from a released control block");
        debug_assert!(self.live > 0, "remove from an empty control block");
        self.live -= 1;
        if index < INLINE_SLOTS {
            debug_assert!(
                matches!(self.inline[index as usize], Slot::Used { .. }),
                "remove of a free inline slot"
            );
            self.inline[index as usize] = Slot::Free {
                next: self.inline_free,
            };
            self.inline_free = index;
        } else {
            unsafe { &mut *self.overflow }.release(index - INLINE_SLOTS);
        }
    }

    /// Releases the control block: walks every used slot and writes the
    /// null state into its cell, frees the overflow region and marks the
    /// block zombie. Called exactly once, when the owner dies.
    pub fn clear(&mut self) {
        debug_assert!(!self.zombie, "control block cleared twice");
        for slot in self.inline {
            invalidate(slot);
        }
        if !self.overflow.is_null() {
            let overflow = unsafe { Box::from_raw(self.overflow) };
            for slot in overflow.slots.iter() {
                invalidate(*slot);
            }
            self.overflow = std::ptr::null_mut();
        }
        self.live = 0;
        self.zombie = true;
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn is_zombie(&self) -> bool {
        self.zombie
    }

    /// Number of currently used slots.
    pub fn live_registrations(&self) -> usize {
        self.live as usize
    }

    fn overflow_mut(&mut self) -> &mut OverflowBlock {
        if self.overflow.is_null() {
            self.overflow = Box::into_raw(OverflowBlock::new(OVERFLOW_INITIAL_CAPACITY));
        }
        unsafe { &mut *self.overflow }
    }

    fn slot_mut(&mut self, index: u32) -> &mut Slot {
        if index < INLINE_SLOTS {
            &mut self.inline[index as usize]
        } else {
            let overflow = unsafe { &mut *self.overflow };
            &mut overflow.slots[(index - INLINE_SLOTS) as usize]
        }
    }

    /// Takes a shared object borrow.
    pub fn borrow_shared(&self) {
        let borrows = self.borrows.get();
        assert!(borrows >= 0, "shared borrow while exclusively borrowed");
        self.borrows.set(borrows + 1);
    }

    /// Takes the exclusive object borrow.
    pub fn borrow_exclusive(&self) {
        assert_eq!(self.borrows.get(), 0, "exclusive borrow while borrowed");
        self.borrows.set(-1);
    }

    pub fn release_shared(&self) {
        debug_assert!(self.borrows.get() > 0);
        self.borrows.set(self.borrows.get() - 1);
    }

    pub fn release_exclusive(&self) {
        debug_assert_eq!(self.borrows.get(), -1);
        self.borrows.set(0);
    }

    pub fn has_borrows(&self) -> bool {
        self.borrows.get() != 0
    }
}

fn invalidate(slot: Slot) {
    if let Slot::Used { cell } = slot {
        unsafe {
            let cell = cell.as_ptr();
            (*cell).target = std::ptr::null_mut();
            (*cell).block = std::ptr::null_mut();
            (*cell).index = UNREGISTERED;
        }
    }
}
