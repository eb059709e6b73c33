//! Ordered-candidate, first-success-wins helpers.
//!
//! Three places in the crate walk a fallback chain: font lookup
//! ([`crate::asset::fonts`]), executable discovery ([`crate::process`]) and the
//! PDF → Markdown mode fallback ([`crate::batch`]). They all go through these
//! two functions so the "stop at the first hit, keep order" rule lives in one
//! place.

use std::future::Future;

/// Return the first `probe` result that is `Some`, trying candidates in order.
///
/// Candidates after the first hit are never probed.
pub fn first_match<T, R, I, F>(candidates: I, probe: F) -> Option<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Option<R>,
{
    candidates.into_iter().find_map(probe)
}

/// Async form of [`first_match`]. Probes run one after another, never
/// concurrently.
pub async fn first_match_async<T, R, I, F, Fut>(candidates: I, mut probe: F) -> Option<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    for candidate in candidates {
        if let Some(hit) = probe(candidate).await {
            return Some(hit);
        }
    }
    None
}
