//! The nullable handle: a non-owning, untracked view.

use std::marker::PhantomData;

use tether_common::{Error, Result};

use crate::owning::OwningHandle;
use crate::soft::SoftHandle;

/// Non-owning, unregistered reference with no invalidation guarantee.
///
/// A strictly weaker view than [`SoftHandle`], meant for short-lived
/// references whose validity is structurally bounded by the caller (a
/// parameter that points somewhere valid for the duration of the call, a
/// stack-scoped alias). Nothing nulls it when the owner dies, so every
/// access carries the caller's obligation that the target is still alive;
/// the accessors are `unsafe` for that reason. The only check performed is
/// against null.
pub struct NullableHandle<T> {
    target: *mut T,
    _marker: PhantomData<*mut T>,
}

impl<T> NullableHandle<T> {
    pub fn null() -> NullableHandle<T> {
        NullableHandle {
            target: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_ptr(target: *mut T) -> NullableHandle<T> {
        NullableHandle {
            target,
            _marker: PhantomData,
        }
    }

    /// Views an object through an existing reference.
    pub fn from_ref(target: &T) -> NullableHandle<T> {
        NullableHandle::from_ptr(target as *const T as *mut T)
    }

    pub fn as_ptr(&self) -> *mut T {
        self.target
    }

    pub fn is_null(&self) -> bool {
        self.target.is_null()
    }

    /// Null-checked access.
    ///
    /// # Safety
    ///
    /// A non-null target must point at a live object; this handle carries no
    /// invalidation, so liveness is entirely the caller's obligation.
    pub unsafe fn get(&self) -> Option<&T> {
        unsafe { self.target.as_ref() }
    }

    /// Null-checked exclusive access.
    ///
    /// # Safety
    ///
    /// Same as [`get`](NullableHandle::get), plus no other reference to the
    /// object may be live.
    pub unsafe fn get_mut(&mut self) -> Option<&mut T> {
        unsafe { self.target.as_mut() }
    }

    /// # Safety
    ///
    /// Same as [`get`](NullableHandle::get).
    pub unsafe fn try_get(&self) -> Result<&T> {
        unsafe { self.get() }.ok_or_else(|| Error::null_deref("nullable handle"))
    }

    /// # Safety
    ///
    /// Same as [`get_mut`](NullableHandle::get_mut).
    pub unsafe fn try_get_mut(&mut self) -> Result<&mut T> {
        unsafe { self.get_mut() }.ok_or_else(|| Error::null_deref("nullable handle"))
    }

    pub fn reset(&mut self) {
        self.target = std::ptr::null_mut();
    }
}

impl<T> Clone for NullableHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NullableHandle<T> {}

impl<T> Default for NullableHandle<T> {
    fn default() -> Self {
        NullableHandle::null()
    }
}

impl<T> From<&OwningHandle<T>> for NullableHandle<T> {
    fn from(owner: &OwningHandle<T>) -> NullableHandle<T> {
        owner.nullable()
    }
}

impl<T> From<&SoftHandle<T>> for NullableHandle<T> {
    fn from(soft: &SoftHandle<T>) -> NullableHandle<T> {
        NullableHandle::from_ptr(soft.as_ptr())
    }
}

impl<T> PartialEq for NullableHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<T> Eq for NullableHandle<T> {}

impl<T> std::fmt::Debug for NullableHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullableHandle")
            .field("target", &self.target)
            .finish()
    }
}
