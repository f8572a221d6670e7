//! Block headers and the allocate/deallocate entry points.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::quarantine;

/// Alignment of every usable region returned by this allocator.
pub const BLOCK_ALIGN: usize = 16;

/// Fill byte written over a block's usable region on zombie release.
pub const POISON_BYTE: u8 = 0xDF;

/// Lifecycle states recorded in the block header. The values are arbitrary
/// magic constants so that a corrupted or mis-addressed header is unlikely to
/// pass the state assertions.
const STATE_LIVE: u32 = 0xB10C_A11E;
const STATE_ZOMBIE: u32 = 0xB10C_DEAD;

/// Header placed in front of every usable region.
///
/// The header occupies exactly [`prefix_size`] bytes, so the usable region
/// starts at `header_address + prefix_size()` and retains the block
/// alignment.
#[repr(C)]
struct BlockHeader {
    /// Usable region size in bytes (the caller-requested size).
    size: usize,
    /// One of the `STATE_*` magic values.
    state: u32,
    _pad: u32,
}

const _: () = assert!(std::mem::size_of::<BlockHeader>() == 16);
const _: () = assert!(std::mem::size_of::<BlockHeader>().is_multiple_of(BLOCK_ALIGN));

/// Returns the number of bytes this allocator reserves in front of the
/// usable region for its block header.
#[inline]
pub fn prefix_size() -> usize {
    std::mem::size_of::<BlockHeader>()
}

#[inline]
fn block_layout(size: usize) -> std::io::Result<Layout> {
    let total = size
        .checked_add(prefix_size())
        .ok_or_else(|| std::io::Error::other("block size overflow"))?;
    Layout::from_size_align(total, BLOCK_ALIGN).map_err(std::io::Error::other)
}

#[inline]
unsafe fn header_of(base: *mut u8) -> *mut BlockHeader {
    unsafe { base.sub(prefix_size()) as *mut BlockHeader }
}

/// Allocates a block with a usable region of at least `size` bytes, aligned
/// to [`BLOCK_ALIGN`]. Returns a pointer to the usable region, not to the
/// header in front of it.
///
/// A zero `size` is legal and yields a block whose usable region may not be
/// read or written.
pub fn allocate(size: usize) -> std::io::Result<NonNull<u8>> {
    let layout = block_layout(size)?;
    let raw = unsafe { std::alloc::alloc(layout) };
    let Some(raw) = NonNull::new(raw) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            format!("failed to allocate block of {size} bytes"),
        ));
    };
    unsafe {
        (raw.as_ptr() as *mut BlockHeader).write(BlockHeader {
            size,
            state: STATE_LIVE,
            _pad: 0,
        });
        Ok(NonNull::new_unchecked(raw.as_ptr().add(prefix_size())))
    }
}

/// Releases a block immediately, without a quarantine window.
///
/// # Safety
///
/// `base` must be a live usable-region pointer previously returned by
/// [`allocate`] or [`zombie_allocate`], not released since.
pub unsafe fn deallocate(base: NonNull<u8>) {
    unsafe {
        let header = header_of(base.as_ptr());
        debug_assert_eq!((*header).state, STATE_LIVE, "deallocate of a non-live block");
        let layout = block_layout((*header).size).expect("layout of existing block");
        std::alloc::dealloc(header as *mut u8, layout);
    }
}

/// Allocates a block whose eventual release is expected to go through
/// [`zombie_deallocate`]. Identical to [`allocate`] at allocation time.
pub fn zombie_allocate(size: usize) -> std::io::Result<NonNull<u8>> {
    allocate(size)
}

/// Releases a block through the zombie quarantine: the usable region is
/// overwritten with [`POISON_BYTE`], the header state flips to zombie, and
/// the memory stays mapped until the per-thread quarantine budget evicts it.
///
/// # Safety
///
/// `base` must be a live usable-region pointer previously returned by
/// [`allocate`] or [`zombie_allocate`], not released since.
pub unsafe fn zombie_deallocate(base: NonNull<u8>) {
    unsafe {
        let header = header_of(base.as_ptr());
        debug_assert_eq!(
            (*header).state,
            STATE_LIVE,
            "zombie_deallocate of a non-live block"
        );
        let size = (*header).size;
        base.as_ptr().write_bytes(POISON_BYTE, size);
        (*header).state = STATE_ZOMBIE;
        quarantine::park(header as *mut u8, prefix_size() + size);
    }
}

/// Frees a quarantined block for real. Called by the quarantine on eviction.
pub(crate) unsafe fn release_zombie(header: *mut u8, total_size: usize) {
    unsafe {
        debug_assert_eq!(
            (*(header as *mut BlockHeader)).state,
            STATE_ZOMBIE,
            "quarantine held a non-zombie block"
        );
        let layout = Layout::from_size_align(total_size, BLOCK_ALIGN)
            .expect("layout of quarantined block");
        std::alloc::dealloc(header, layout);
    }
}

/// Reports whether `candidate` points into the usable region of the block
/// based at `base`.
///
/// # Safety
///
/// `base` must be a usable-region pointer of a live or quarantined block.
pub unsafe fn is_pointer_in_block(base: NonNull<u8>, candidate: *const u8) -> bool {
    let size = unsafe { block_size(base) };
    let start = base.as_ptr() as usize;
    let addr = candidate as usize;
    addr >= start && addr < start + size
}

/// Returns the usable size of the block based at `base`.
///
/// # Safety
///
/// `base` must be a usable-region pointer of a live or quarantined block.
pub unsafe fn block_size(base: NonNull<u8>) -> usize {
    unsafe {
        let header = header_of(base.as_ptr());
        let state = (*header).state;
        debug_assert!(
            state == STATE_LIVE || state == STATE_ZOMBIE,
            "header of a released block"
        );
        (*header).size
    }
}

/// Reports whether the block based at `base` has been zombie-released.
///
/// # Safety
///
/// `base` must be a usable-region pointer of a live or quarantined block.
pub unsafe fn is_zombie_block(base: NonNull<u8>) -> bool {
    unsafe {
        let header = header_of(base.as_ptr());
        (*header).state == STATE_ZOMBIE
    }
}
