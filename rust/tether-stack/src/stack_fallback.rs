/// Stack bounds are not known on this platform. Callers fall back to
/// treating every address as heap-resident.
pub(crate) fn query_stack_bounds() -> Option<(usize, usize)> {
    None
}
