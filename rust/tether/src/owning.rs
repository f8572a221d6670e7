//! The owning handle: exclusive, destructive owner of one heap object.

use std::marker::PhantomData;
use std::ptr::NonNull;

use tether_block_alloc as block_alloc;
use tether_common::{Error, Result};

use crate::borrow::{Ref, RefMut};
use crate::control::{self, ControlBlock};
use crate::nullable::NullableHandle;
use crate::self_ref::{self, SelfRef};
use crate::soft::SoftHandle;

/// Largest payload alignment the storage layout supports.
const MAX_PAYLOAD_ALIGN: usize = 4096;

/// Exclusive owner of one heap object and its control block, or null.
///
/// Creation places a [`ControlBlock`] immediately in front of the object,
/// inside a single zombie-allocated block. Destruction (or [`reset`]) first
/// walks the control block and nulls every registered [`SoftHandle`], then
/// drops the object in place and zombie-releases the storage, so stale
/// access reads as null or poison instead of reusing the memory.
///
/// Move-only by construction; the handle is `!Send` and `!Sync`, matching
/// the single-threaded ownership model.
///
/// [`reset`]: OwningHandle::reset
pub struct OwningHandle<T> {
    obj: *mut T,
    _marker: PhantomData<T>,
}

impl<T> OwningHandle<T> {
    /// An empty handle owning nothing.
    pub fn null() -> OwningHandle<T> {
        OwningHandle {
            obj: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Allocates storage for `value` plus its control block and takes
    /// ownership of it.
    pub fn new(value: T) -> Result<OwningHandle<T>> {
        let (obj, _block) = allocate_for::<T>()?;
        unsafe { obj.as_ptr().write(value) };
        Ok(OwningHandle {
            obj: obj.as_ptr(),
            _marker: PhantomData,
        })
    }

    /// Allocates storage first and then runs `f` to construct the value, so
    /// the object under construction can mint soft handles to itself through
    /// the passed [`SelfRef`] (or [`self_ref::soft_to_current`] deeper in
    /// the call tree).
    pub fn new_cyclic<F>(f: F) -> Result<OwningHandle<T>>
    where
        F: FnOnce(&SelfRef<T>) -> T,
    {
        let (obj, block) = allocate_for::<T>()?;
        let cleanup = ConstructionCleanup { block };
        let value = {
            let _frame = self_ref::push_frame(block);
            let self_ref = SelfRef::new(block, obj);
            f(&self_ref)
        };
        unsafe { obj.as_ptr().write(value) };
        std::mem::forget(cleanup);
        Ok(OwningHandle {
            obj: obj.as_ptr(),
            _marker: PhantomData,
        })
    }

    pub fn is_null(&self) -> bool {
        self.obj.is_null()
    }

    /// The owned object's address; null for an empty handle.
    pub fn as_ptr(&self) -> *mut T {
        self.obj
    }

    /// Shared borrow of the owned object, or `None` for an empty handle.
    pub fn get(&self) -> Option<Ref<'_, T>> {
        let obj = NonNull::new(self.obj)?;
        Some(unsafe { Ref::new(obj, block_of(obj)) })
    }

    /// Exclusive borrow of the owned object, or `None` for an empty handle.
    ///
    /// # Panics
    ///
    /// Panics if any borrow of the object is outstanding, including through
    /// a soft handle.
    pub fn get_mut(&mut self) -> Option<RefMut<'_, T>> {
        let obj = NonNull::new(self.obj)?;
        Some(unsafe { RefMut::new(obj, block_of(obj)) })
    }

    pub fn try_get(&self) -> Result<Ref<'_, T>> {
        self.get()
            .ok_or_else(|| Error::null_deref("owning handle"))
    }

    pub fn try_get_mut(&mut self) -> Result<RefMut<'_, T>> {
        self.get_mut()
            .ok_or_else(|| Error::null_deref("owning handle"))
    }

    /// Mints a tracked, auto-invalidated reference to the owned object.
    /// A null owner yields a null soft handle.
    pub fn soft(&self) -> SoftHandle<T> {
        match NonNull::new(self.obj) {
            Some(obj) => unsafe { SoftHandle::register(obj.cast::<u8>(), block_of(obj)) },
            None => SoftHandle::null(),
        }
    }

    /// Mints an untracked view of the owned object.
    pub fn nullable(&self) -> NullableHandle<T> {
        NullableHandle::from_ptr(self.obj)
    }

    /// Number of soft handles currently registered against the owned
    /// allocation.
    pub fn tracked_handles(&self) -> usize {
        match NonNull::new(self.obj) {
            Some(obj) => unsafe { block_of(obj).as_ref() }.live_registrations(),
            None => 0,
        }
    }

    /// Releases the owned object: nulls every registered soft handle, drops
    /// the object in place and zombie-releases the storage. The handle
    /// becomes null. A null handle is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if a borrow of the object is outstanding; releasing the
    /// storage under a live borrow would be a use-after-free.
    pub fn reset(&mut self) {
        let Some(obj) = NonNull::new(self.obj) else {
            return;
        };
        let block = unsafe { block_of(obj) };
        unsafe {
            assert!(
                !block.as_ref().has_borrows(),
                "owning handle released while the object is borrowed"
            );
            let base = block.as_ref().base();
            (*block.as_ptr()).clear();
            std::ptr::drop_in_place(obj.as_ptr());
            block_alloc::zombie_deallocate(base);
        }
        self.obj = std::ptr::null_mut();
    }

    /// Exchanges the owned allocations. Registered soft handles keep
    /// tracking the allocation they were created from.
    pub fn swap(&mut self, other: &mut OwningHandle<T>) {
        std::mem::swap(&mut self.obj, &mut other.obj);
    }
}

impl<T> Drop for OwningHandle<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for OwningHandle<T> {
    fn default() -> Self {
        OwningHandle::null()
    }
}

impl<T> PartialEq for OwningHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.obj == other.obj
    }
}

impl<T> Eq for OwningHandle<T> {}

impl<T> std::fmt::Debug for OwningHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwningHandle")
            .field("obj", &self.obj)
            .finish()
    }
}

/// Control block address of a live owned object. The block always sits
/// immediately in front of the object, inside the same allocation.
pub(crate) unsafe fn block_of<T>(obj: NonNull<T>) -> NonNull<ControlBlock> {
    unsafe {
        NonNull::new_unchecked(
            (obj.as_ptr() as *mut u8).sub(control::header_size()) as *mut ControlBlock
        )
    }
}

/// Allocates and initializes storage shaped `[control block][object]`,
/// padded in front when the payload alignment exceeds the allocator's.
fn allocate_for<T>() -> Result<(NonNull<T>, NonNull<ControlBlock>)> {
    let align = std::mem::align_of::<T>();
    tether_common::verify_arg!(T, align <= MAX_PAYLOAD_ALIGN);
    let headroom = align.saturating_sub(block_alloc::block::BLOCK_ALIGN);
    let size = control::header_size() + std::mem::size_of::<T>() + headroom;
    let base = block_alloc::zombie_allocate(size)
        .map_err(|e| Error::allocation("owning handle storage", e))?;
    let obj_addr = align_up(base.as_ptr() as usize + control::header_size(), align);
    let block = (obj_addr - control::header_size()) as *mut ControlBlock;
    unsafe {
        ControlBlock::init(block, base);
        Ok((
            NonNull::new_unchecked(obj_addr as *mut T),
            NonNull::new_unchecked(block),
        ))
    }
}

#[inline]
fn align_up(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (n + alignment - 1) & !(alignment - 1)
}

/// Releases construction-time storage if `new_cyclic` unwinds before the
/// value lands. Soft handles minted during the aborted construction are
/// dropped by the unwind first, so the block is empty by the time this runs.
struct ConstructionCleanup {
    block: NonNull<ControlBlock>,
}

impl Drop for ConstructionCleanup {
    fn drop(&mut self) {
        unsafe {
            let base = self.block.as_ref().base();
            (*self.block.as_ptr()).clear();
            block_alloc::zombie_deallocate(base);
        }
    }
}
