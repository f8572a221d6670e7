//! Self-references for objects under construction.
//!
//! An object being built inside [`OwningHandle::new_cyclic`] has no handle
//! pointing at it yet, so it cannot obtain a soft handle to itself the
//! ordinary way. The owning handle therefore publishes the allocation under
//! construction in a thread-local frame stack for the duration of the
//! constructor; [`soft_to_current`] (and the scoped [`SelfRef`] passed to
//! the constructor closure) mint soft handles against that frame.
//!
//! [`OwningHandle::new_cyclic`]: crate::OwningHandle::new_cyclic

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use tether_block_alloc as block_alloc;
use tether_common::{Error, Result};

use crate::control::ControlBlock;
use crate::soft::SoftHandle;

#[derive(Clone, Copy)]
struct Frame {
    block: NonNull<ControlBlock>,
    base: NonNull<u8>,
}

thread_local! {
    /// Stack of allocations under construction; nested `new_cyclic` calls
    /// push nested frames.
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Publishes `block` as the allocation under construction until the guard
/// drops.
pub(crate) fn push_frame(block: NonNull<ControlBlock>) -> FrameGuard {
    let base = unsafe { block.as_ref() }.base();
    FRAMES.with(|frames| frames.borrow_mut().push(Frame { block, base }));
    FrameGuard(())
}

pub(crate) struct FrameGuard(());

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Mints a soft handle to `addr`, which must lie within the allocation
/// currently under construction on this thread.
///
/// Fails with `InvalidOperation` outside of a constructor run by
/// `new_cyclic`, and with `OutOfRange` if `addr` points outside the
/// allocation under construction.
pub fn soft_to_current<U>(addr: *const U) -> Result<SoftHandle<U>> {
    let Some(frame) = FRAMES.with(|frames| frames.borrow().last().copied()) else {
        return Err(Error::invalid_operation("self reference outside construction"));
    };
    mint(frame, addr)
}

fn mint<U>(frame: Frame, addr: *const U) -> Result<SoftHandle<U>> {
    if !unsafe { block_alloc::is_pointer_in_block(frame.base, addr as *const u8) } {
        return Err(Error::out_of_range("self reference"));
    }
    unsafe {
        Ok(SoftHandle::register(
            NonNull::new_unchecked(addr as *mut U).cast::<u8>(),
            frame.block,
        ))
    }
}

/// Scoped view of the allocation under construction, passed to the
/// constructor closure of `new_cyclic`.
pub struct SelfRef<T> {
    block: NonNull<ControlBlock>,
    object: NonNull<T>,
    _marker: PhantomData<*mut T>,
}

impl<T> SelfRef<T> {
    pub(crate) fn new(block: NonNull<ControlBlock>, object: NonNull<T>) -> SelfRef<T> {
        SelfRef {
            block,
            object,
            _marker: PhantomData,
        }
    }

    /// The address the object will occupy once construction completes.
    pub fn as_ptr(&self) -> *const T {
        self.object.as_ptr()
    }

    /// Soft handle to the object under construction. It is registered
    /// immediately; its target becomes dereferenceable when `new_cyclic`
    /// returns.
    pub fn soft(&self) -> SoftHandle<T> {
        unsafe { SoftHandle::register(self.object.cast::<u8>(), self.block) }
    }

    /// Soft handle to a member of the object under construction, given the
    /// address it will occupy.
    pub fn soft_to<U>(&self, addr: *const U) -> Result<SoftHandle<U>> {
        let base = unsafe { self.block.as_ref() }.base();
        mint(
            Frame {
                block: self.block,
                base,
            },
            addr,
        )
    }
}
