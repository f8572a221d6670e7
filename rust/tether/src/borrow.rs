//! Borrow guards handed out by the handle accessors.
//!
//! Object access is runtime-checked against the borrow account kept in the
//! allocation's control block: any number of shared guards, or one exclusive
//! guard. Releasing the owning handle while a guard is outstanding is a
//! fatal contract breach, which is what makes handing out plain references
//! from raw-pointer handles sound.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::control::ControlBlock;

/// Shared borrow of an object reached through a handle.
pub struct Ref<'a, T> {
    target: NonNull<T>,
    block: NonNull<ControlBlock>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Ref<'a, T> {
    /// # Safety
    ///
    /// `target` must be the live object governed by `block`, and `block`
    /// must stay valid for `'a` (guaranteed by the borrow account: the owner
    /// refuses to release the allocation while guards exist).
    pub(crate) unsafe fn new(target: NonNull<T>, block: NonNull<ControlBlock>) -> Ref<'a, T> {
        unsafe { block.as_ref() }.borrow_shared();
        Ref {
            target,
            block,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for Ref<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.target.as_ref() }
    }
}

impl<T> Drop for Ref<'_, T> {
    fn drop(&mut self) {
        unsafe { self.block.as_ref() }.release_shared();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Ref<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}

/// Exclusive borrow of an object reached through a handle.
pub struct RefMut<'a, T> {
    target: NonNull<T>,
    block: NonNull<ControlBlock>,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T> RefMut<'a, T> {
    /// # Safety
    ///
    /// Same contract as [`Ref::new`].
    pub(crate) unsafe fn new(target: NonNull<T>, block: NonNull<ControlBlock>) -> RefMut<'a, T> {
        unsafe { block.as_ref() }.borrow_exclusive();
        RefMut {
            target,
            block,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for RefMut<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.target.as_ref() }
    }
}

impl<T> DerefMut for RefMut<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.target.as_mut() }
    }
}

impl<T> Drop for RefMut<'_, T> {
    fn drop(&mut self) {
        unsafe { self.block.as_ref() }.release_exclusive();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RefMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}
