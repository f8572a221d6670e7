use tether_common::ErrorKind;

use crate::{NullableHandle, OwningHandle, SoftHandle, self_ref};

#[test]
fn owner_reset_nulls_every_soft_handle() {
    let mut owner = OwningHandle::new(5i32).unwrap();
    let a = owner.soft();
    let b = owner.soft();
    assert_eq!(owner.tracked_handles(), 2);

    owner.reset();
    assert!(owner.is_null());
    assert!(a.is_null());
    assert!(b.is_null());
    assert!(matches!(
        a.try_get().unwrap_err().kind(),
        ErrorKind::NullDereference { .. }
    ));
    assert!(matches!(
        b.try_get().unwrap_err().kind(),
        ErrorKind::NullDereference { .. }
    ));
}

#[test]
fn drop_of_owner_behaves_like_reset() {
    let owner = OwningHandle::new("alive".to_string()).unwrap();
    let soft = owner.soft();
    assert_eq!(soft.get().unwrap().as_str(), "alive");
    drop(owner);
    assert!(soft.is_null());
}

#[test]
fn mutation_through_one_handle_is_visible_through_another() {
    let owner = OwningHandle::new(5i32).unwrap();
    let mut a = owner.soft();
    let b = owner.soft();

    *a.get_mut().unwrap() = 7;
    assert_eq!(*b.get().unwrap(), 7);
    assert_eq!(*owner.get().unwrap(), 7);
}

#[test]
fn swap_exchanges_tracking_identity() {
    let mut x = OwningHandle::new(1i32).unwrap();
    let y = OwningHandle::new(2i32).unwrap();
    let mut a = x.soft();
    let mut b = y.soft();

    a.swap(&mut b);
    assert_eq!(*a.get().unwrap(), 2);
    assert_eq!(*b.get().unwrap(), 1);

    // After the swap, `b` tracks x's allocation and `a` tracks y's.
    x.reset();
    assert!(b.is_null());
    assert_eq!(*a.get().unwrap(), 2);
}

#[test]
fn moving_a_handle_preserves_its_registration() {
    let mut owner = OwningHandle::new(42u64).unwrap();
    let soft = owner.soft();
    assert_eq!(owner.tracked_handles(), 1);

    // Move the handle into heap storage; the registration must follow.
    let mut stored = Vec::new();
    stored.push(soft);
    assert_eq!(owner.tracked_handles(), 1);

    owner.reset();
    assert!(stored[0].is_null());
}

#[test]
fn clones_are_tracked_independently() {
    let mut owner = OwningHandle::new(3i32).unwrap();
    let original = owner.soft();
    let copy = original.clone();
    assert_eq!(owner.tracked_handles(), 2);
    assert_eq!(original, copy);

    drop(original);
    assert_eq!(owner.tracked_handles(), 1);
    assert_eq!(*copy.get().unwrap(), 3);

    owner.reset();
    assert!(copy.is_null());
}

#[test]
fn clone_from_reuses_the_registration_on_the_same_allocation() {
    let mut owner = OwningHandle::new(4i32).unwrap();
    let source = owner.soft();
    let mut dest = owner.soft();
    assert_eq!(owner.tracked_handles(), 2);

    // Same allocation: the destination keeps its own cell, no churn.
    dest.clone_from(&source);
    assert_eq!(owner.tracked_handles(), 2);
    assert_eq!(*dest.get().unwrap(), 4);

    owner.reset();
    assert!(dest.is_null());
    assert!(source.is_null());
}

#[test]
fn clone_from_across_allocations_moves_the_registration() {
    let mut x = OwningHandle::new(1i32).unwrap();
    let mut y = OwningHandle::new(2i32).unwrap();
    let source = y.soft();
    let mut dest = x.soft();
    assert_eq!(x.tracked_handles(), 1);
    assert_eq!(y.tracked_handles(), 1);

    // Different allocation: deregister from x's block, register in y's.
    dest.clone_from(&source);
    assert_eq!(x.tracked_handles(), 0);
    assert_eq!(y.tracked_handles(), 2);
    assert_eq!(*dest.get().unwrap(), 2);

    x.reset();
    assert_eq!(*dest.get().unwrap(), 2);
    y.reset();
    assert!(dest.is_null());
}

#[test]
fn clone_of_a_dead_handle_is_null() {
    let mut owner = OwningHandle::new(1u8).unwrap();
    let soft = owner.soft();
    owner.reset();
    let copy = soft.clone();
    assert!(copy.is_null());
    assert_eq!(owner.tracked_handles(), 0);
}

#[test]
fn registration_churn_past_the_inline_slots() {
    let mut owner = OwningHandle::new(0i64).unwrap();
    let mut handles: Vec<SoftHandle<i64>> = (0..10).map(|_| owner.soft()).collect();
    assert_eq!(owner.tracked_handles(), 10);

    handles.drain(..5);
    assert_eq!(owner.tracked_handles(), 5);
    for _ in 0..5 {
        handles.push(owner.soft());
    }
    assert_eq!(owner.tracked_handles(), 10);

    owner.reset();
    assert!(handles.iter().all(SoftHandle::is_null));
}

// repr(C) keeps `base` at offset 0, which is what makes the upcast via
// `cast` address-preserving.
#[repr(C)]
struct Base {
    id: u32,
}

#[repr(C)]
struct Derived {
    base: Base,
    payload: u64,
}

#[test]
fn projection_preserves_invalidation_coupling() {
    let mut owner = OwningHandle::new(Derived {
        base: Base { id: 11 },
        payload: 99,
    })
    .unwrap();
    let derived = owner.soft();
    let base = derived.project(|d| &d.base).unwrap();
    assert_eq!(base.get().unwrap().id, 11);
    assert_eq!(owner.tracked_handles(), 2);

    // Cast the base handle back up; the address and coupling are preserved.
    let round_trip: SoftHandle<Derived> = unsafe { base.cast() };
    assert_eq!(round_trip.as_ptr(), derived.as_ptr());
    assert_eq!(round_trip.get().unwrap().payload, 99);

    owner.reset();
    assert!(derived.is_null());
    assert!(base.is_null());
    assert!(round_trip.is_null());
}

#[test]
fn projection_outside_the_allocation_is_rejected() {
    static ELSEWHERE: i32 = 0;
    let owner = OwningHandle::new(1i32).unwrap();
    let soft = owner.soft();
    let err = soft.project(|_| &ELSEWHERE).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::OutOfRange { .. }));
    // The failed projection must not leak a registration.
    assert_eq!(owner.tracked_handles(), 1);
}

struct Node {
    me: SoftHandle<Node>,
    value: i32,
}

#[test]
fn object_can_reference_itself_during_construction() {
    let mut owner = OwningHandle::new_cyclic(|this| Node {
        me: this.soft(),
        value: 7,
    })
    .unwrap();

    {
        let node = owner.get().unwrap();
        assert_eq!(node.value, 7);
        assert_eq!(node.me.as_ptr(), owner.as_ptr());
        assert_eq!(node.me.get().unwrap().value, 7);
    }
    assert_eq!(owner.tracked_handles(), 1);

    owner.reset();
    assert!(owner.is_null());
}

#[test]
fn self_reference_from_deep_in_the_constructor() {
    // Reaches the allocation under construction through the thread-local
    // frame instead of the SelfRef parameter.
    fn build(addr: *const Node, value: i32) -> Node {
        let me = self_ref::soft_to_current(addr).unwrap();
        Node { me, value }
    }

    let owner = OwningHandle::new_cyclic(|this| {
        // A constructor-local address is not part of the allocation.
        let local = 0i32;
        let err = self_ref::soft_to_current(&raw const local).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::OutOfRange { .. }));
        build(this.as_ptr(), 3)
    })
    .unwrap();
    let node = owner.get().unwrap();
    assert_eq!(node.value, 3);
    assert_eq!(node.me.as_ptr(), owner.as_ptr());
}

#[test]
fn self_reference_outside_construction_is_rejected() {
    let local = 5i32;
    let err = self_ref::soft_to_current(&raw const local).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
}

#[test]
fn nullable_handles_are_untracked() {
    let mut owner = OwningHandle::new(8i32).unwrap();
    let mut n: NullableHandle<i32> = owner.nullable();
    assert_eq!(unsafe { *n.try_get().unwrap() }, 8);
    unsafe { *n.try_get_mut().unwrap() = 9 };
    assert_eq!(unsafe { *n.try_get().unwrap() }, 9);
    assert_eq!(owner.tracked_handles(), 0);

    let mut empty: NullableHandle<i32> = NullableHandle::null();
    assert!(matches!(
        unsafe { empty.try_get_mut() }.unwrap_err().kind(),
        ErrorKind::NullDereference { .. }
    ));

    let before = n.as_ptr();
    owner.reset();
    // No invalidation: the view still carries the stale address.
    assert_eq!(n.as_ptr(), before);
    assert!(!n.is_null());
}

#[test]
fn owner_swap_keeps_registrations_with_their_allocations() {
    let mut x = OwningHandle::new(1i32).unwrap();
    let mut y = OwningHandle::new(2i32).unwrap();
    let sx = x.soft();
    let sy = y.soft();

    x.swap(&mut y);
    assert_eq!(*x.get().unwrap(), 2);
    assert_eq!(*sx.get().unwrap(), 1);

    // x now owns the allocation sy tracks.
    x.reset();
    assert!(sy.is_null());
    assert_eq!(*sx.get().unwrap(), 1);
}

#[test]
fn null_owner_hands_out_null_views() {
    let mut owner: OwningHandle<i32> = OwningHandle::null();
    assert!(owner.is_null());
    assert!(owner.get().is_none());
    assert!(owner.soft().is_null());
    assert!(owner.nullable().is_null());
    assert!(matches!(
        owner.try_get().unwrap_err().kind(),
        ErrorKind::NullDereference { .. }
    ));
    // Resetting a null owner is a no-op.
    owner.reset();
    assert!(owner.is_null());
}

#[repr(align(64))]
struct OverAligned {
    value: u8,
}

#[test]
fn over_aligned_payloads_are_placed_correctly() {
    let owner = OwningHandle::new(OverAligned { value: 9 }).unwrap();
    assert!((owner.as_ptr() as usize).is_multiple_of(64));
    assert_eq!(owner.get().unwrap().value, 9);
}

#[test]
fn zero_sized_payloads_are_supported() {
    let mut owner = OwningHandle::new(()).unwrap();
    let soft = owner.soft();
    assert!(!soft.is_null());
    owner.reset();
    assert!(soft.is_null());
}

#[test]
#[should_panic(expected = "exclusive borrow while borrowed")]
fn exclusive_access_conflicts_with_shared_access() {
    let mut owner = OwningHandle::new(1i32).unwrap();
    let soft = owner.soft();
    let _shared = soft.get().unwrap();
    let _exclusive = owner.get_mut();
}

#[test]
#[should_panic(expected = "released while the object is borrowed")]
fn reset_under_an_outstanding_borrow_is_fatal() {
    let mut owner = OwningHandle::new(1i32).unwrap();
    let soft = owner.soft();
    let _shared = soft.get().unwrap();
    owner.reset();
}

#[test]
fn randomized_registration_churn() {
    fastrand::seed(0x7E7);

    let mut owner = OwningHandle::new(0u64).unwrap();
    let mut handles: Vec<SoftHandle<u64>> = Vec::new();
    for _ in 0..2000 {
        match fastrand::u32(0..3) {
            0 => handles.push(owner.soft()),
            1 if !handles.is_empty() => {
                let i = fastrand::usize(0..handles.len());
                let copy = handles[i].clone();
                handles.push(copy);
            }
            _ => {
                if !handles.is_empty() {
                    let i = fastrand::usize(0..handles.len());
                    handles.swap_remove(i);
                }
            }
        }
        assert_eq!(owner.tracked_handles(), handles.len());
    }

    owner.reset();
    assert!(handles.iter().all(SoftHandle::is_null));
}
