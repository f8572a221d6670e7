//! Reference-tracking memory safety for manually-managed heap objects.
//!
//! An [`OwningHandle`] is the exclusive owner of one heap object. Any number
//! of [`SoftHandle`]s may reference that object; each one registers itself
//! in a control block stored immediately in front of the object. When the
//! owner is reset or dropped it walks those registrations and nulls every
//! soft handle before destroying the object and zombie-releasing the
//! storage, so a stale access reads as a detectable null instead of
//! undefined behavior.
//!
//! ```
//! use tether::OwningHandle;
//!
//! let mut owner = OwningHandle::new(5i32).unwrap();
//! let soft = owner.soft();
//! assert_eq!(*soft.get().unwrap(), 5);
//!
//! owner.reset();
//! assert!(soft.is_null());
//! assert!(soft.get().is_none());
//! ```
//!
//! [`NullableHandle`] is the untracked little sibling for call-scoped
//! references, and [`self_ref`] lets an object under construction mint soft
//! handles to itself before any owning handle exists.

mod borrow;
mod control;
pub mod nullable;
pub mod owning;
pub mod self_ref;
pub mod soft;

pub use borrow::{Ref, RefMut};
pub use nullable::NullableHandle;
pub use owning::OwningHandle;
pub use self_ref::SelfRef;
pub use soft::SoftHandle;
pub use tether_common::{Error, ErrorKind, Result};
pub use tether_stack::is_stack_resident;

#[cfg(test)]
mod tests;
