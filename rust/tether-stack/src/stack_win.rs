use windows_sys::Win32::System::Threading::GetCurrentThreadStackLimits;

/// Queries the calling thread's stack extent. `GetCurrentThreadStackLimits`
/// reports the full reserved range of the current stack and cannot fail.
pub(crate) fn query_stack_bounds() -> Option<(usize, usize)> {
    let mut low: usize = 0;
    let mut high: usize = 0;
    unsafe {
        GetCurrentThreadStackLimits(&mut low, &mut high);
    }
    (low < high).then_some((low, high))
}
