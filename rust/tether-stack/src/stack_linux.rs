/// Queries the calling thread's stack extent through the pthread attribute
/// API. Returns `(start, end)` addresses, or `None` if any pthread call
/// fails.
pub(crate) fn query_stack_bounds() -> Option<(usize, usize)> {
    unsafe {
        let mut attr: libc::pthread_attr_t = std::mem::zeroed();
        if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
            return None;
        }
        let mut base: *mut libc::c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let res = libc::pthread_attr_getstack(&attr, &mut base, &mut size);
        libc::pthread_attr_destroy(&mut attr);
        if res != 0 || base.is_null() || size == 0 {
            return None;
        }
        let start = base as usize;
        Some((start, start + size))
    }
}
