//! The soft handle: a non-owning reference that the owner nulls on death.

use std::marker::PhantomData;
use std::ptr::NonNull;

use tether_block_alloc as block_alloc;
use tether_common::{Error, Result};

use crate::borrow::{Ref, RefMut};
use crate::control::{ControlBlock, SoftCell, UNREGISTERED};
use crate::owning::OwningHandle;

/// Non-owning, auto-invalidated reference to an owned heap object.
///
/// A live soft handle owns a heap-pinned registration cell recorded in the
/// target allocation's control block. When the owning handle dies it writes
/// the null state into every registered cell, so every soft handle into the
/// allocation reads as null from that point on. Because the control block
/// references the cell rather than the handle itself, the handle can be
/// moved freely without disturbing its registration.
///
/// Cloning registers a fresh cell: copies are tracked independently.
pub struct SoftHandle<T> {
    /// Boxed registration cell; `None` is the null handle.
    cell: Option<NonNull<SoftCell>>,
    _marker: PhantomData<*mut T>,
}

impl<T> SoftHandle<T> {
    /// A handle referencing nothing.
    pub fn null() -> SoftHandle<T> {
        SoftHandle {
            cell: None,
            _marker: PhantomData,
        }
    }

    /// Registers a new cell for `target` in `block`.
    ///
    /// # Safety
    ///
    /// `target` must point at (or into) the live object governed by `block`.
    pub(crate) unsafe fn register(
        target: NonNull<u8>,
        block: NonNull<ControlBlock>,
    ) -> SoftHandle<T> {
        let cell = Box::into_raw(Box::new(SoftCell {
            target: target.as_ptr(),
            block: block.as_ptr(),
            index: UNREGISTERED,
        }));
        debug_assert!(
            !tether_stack::is_stack_resident(cell as *const ()),
            "registration cell must be heap-pinned"
        );
        unsafe {
            let index = (*block.as_ptr()).insert(NonNull::new_unchecked(cell));
            (*cell).index = index;
            SoftHandle {
                cell: Some(NonNull::new_unchecked(cell)),
                _marker: PhantomData,
            }
        }
    }

    fn cell_ref(&self) -> Option<&SoftCell> {
        self.cell.map(|cell| unsafe { cell.as_ref() })
    }

    /// The referenced address; null if the handle is null or the owner has
    /// died.
    pub fn as_ptr(&self) -> *mut T {
        self.cell_ref()
            .map_or(std::ptr::null_mut(), |cell| cell.target as *mut T)
    }

    pub fn is_null(&self) -> bool {
        self.as_ptr().is_null()
    }

    /// Shared borrow of the referenced object; `None` if the handle is null
    /// or invalidated.
    pub fn get(&self) -> Option<Ref<'_, T>> {
        let cell = self.cell_ref()?;
        let target = NonNull::new(cell.target as *mut T)?;
        let block = NonNull::new(cell.block)?;
        Some(unsafe { Ref::new(target, block) })
    }

    /// Exclusive borrow of the referenced object.
    ///
    /// # Panics
    ///
    /// Panics if any other borrow of the object is outstanding.
    pub fn get_mut(&mut self) -> Option<RefMut<'_, T>> {
        let cell = self.cell_ref()?;
        let target = NonNull::new(cell.target as *mut T)?;
        let block = NonNull::new(cell.block)?;
        Some(unsafe { RefMut::new(target, block) })
    }

    pub fn try_get(&self) -> Result<Ref<'_, T>> {
        self.get().ok_or_else(|| Error::null_deref("soft handle"))
    }

    pub fn try_get_mut(&mut self) -> Result<RefMut<'_, T>> {
        self.get_mut()
            .ok_or_else(|| Error::null_deref("soft handle"))
    }

    /// Deregisters and becomes null.
    pub fn reset(&mut self) {
        if let Some(cell) = self.cell.take() {
            unsafe { release_cell(cell) };
        }
    }

    pub fn swap(&mut self, other: &mut SoftHandle<T>) {
        std::mem::swap(&mut self.cell, &mut other.cell);
    }

    /// Type-preserving cast to a member or embedded sub-object: runs `f` on
    /// the referenced object and returns a handle to the projected address,
    /// registered against the same allocation.
    ///
    /// Fails with `NullDereference` on a dead handle, and with `OutOfRange`
    /// if the projected address does not lie within the source allocation.
    pub fn project<U, F>(&self, f: F) -> Result<SoftHandle<U>>
    where
        F: FnOnce(&T) -> &U,
    {
        let guard = self.try_get()?;
        let addr = f(&guard) as *const U;
        drop(guard);
        let cell = self.cell_ref().expect("live handle has a cell");
        let block = unsafe { NonNull::new_unchecked(cell.block) };
        let base = unsafe { block.as_ref() }.base();
        if !unsafe { block_alloc::is_pointer_in_block(base, addr as *const u8) } {
            return Err(Error::out_of_range("soft handle projection"));
        }
        unsafe {
            Ok(SoftHandle::register(
                NonNull::new_unchecked(addr as *mut U).cast::<u8>(),
                block,
            ))
        }
    }

    /// Reinterprets the referenced address as `U`, with a fresh registration
    /// against the same allocation. A dead handle yields a null handle.
    ///
    /// # Safety
    ///
    /// The referenced object must be valid when read as `U`.
    pub unsafe fn cast<U>(&self) -> SoftHandle<U> {
        match self.cell_ref() {
            Some(cell) if cell.is_live() => unsafe {
                SoftHandle::register(
                    NonNull::new_unchecked(cell.target),
                    NonNull::new_unchecked(cell.block),
                )
            },
            _ => SoftHandle::null(),
        }
    }
}

impl<T> Clone for SoftHandle<T> {
    /// A fresh, independently tracked registration for the same target.
    /// Cloning a dead handle yields a null handle.
    fn clone(&self) -> SoftHandle<T> {
        match self.cell_ref() {
            Some(cell) if cell.is_live() => unsafe {
                SoftHandle::register(
                    NonNull::new_unchecked(cell.target),
                    NonNull::new_unchecked(cell.block),
                )
            },
            _ => SoftHandle::null(),
        }
    }

    /// Reuses the existing registration when both handles already track the
    /// same allocation, avoiding a remove/insert pair.
    fn clone_from(&mut self, source: &SoftHandle<T>) {
        if let (Some(own), Some(src)) = (self.cell, source.cell_ref())
            && src.is_live()
            && unsafe { own.as_ref() }.block == src.block
        {
            unsafe { (*own.as_ptr()).target = src.target };
            return;
        }
        *self = source.clone();
    }
}

impl<T> Drop for SoftHandle<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            unsafe { release_cell(cell) };
        }
    }
}

/// Deregisters a cell (when the owner is still alive) and frees it.
unsafe fn release_cell(cell: NonNull<SoftCell>) {
    unsafe {
        let cell = Box::from_raw(cell.as_ptr());
        if cell.index != UNREGISTERED && !cell.block.is_null() {
            (*cell.block).remove(cell.index);
        }
    }
}

impl<T> Default for SoftHandle<T> {
    fn default() -> Self {
        SoftHandle::null()
    }
}

impl<T> From<&OwningHandle<T>> for SoftHandle<T> {
    fn from(owner: &OwningHandle<T>) -> SoftHandle<T> {
        owner.soft()
    }
}

impl<T> PartialEq for SoftHandle<T> {
    /// Handles compare by dereferenceable address only; two dead handles
    /// compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

impl<T> Eq for SoftHandle<T> {}

impl<T> std::fmt::Debug for SoftHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftHandle")
            .field("target", &self.as_ptr())
            .finish()
    }
}
