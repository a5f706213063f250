use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique resource id.
///
/// Ids are never reused; caches key on them so a recreated resource can
/// never alias a cached entry of a disposed one.
pub(crate) fn next_raw_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}
