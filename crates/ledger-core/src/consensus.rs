use crate::chain::{Chain, ChainValidator};
use std::sync::Arc;
use tracing::debug;

/// Picks the longest candidate that is strictly longer than `current` and
/// passes validation. Equal lengths keep the first one seen.
///
/// Returns `(true, winner)` when a candidate wins, `(false, current)` otherwise.
/// Only candidates that could win are validated, and always before adoption.
pub fn resolve<I>(current: Arc<Chain>, candidates: I, validator: &ChainValidator) -> (bool, Arc<Chain>)
where
    I: IntoIterator<Item = Arc<Chain>>,
{
    let mut best: Option<Arc<Chain>> = None;
    let mut max_len = current.len();

    for candidate in candidates {
        if candidate.len() <= max_len {
            continue;
        }
        if validator.is_valid(&candidate) {
            max_len = candidate.len();
            best = Some(candidate);
        } else {
            debug!(len = candidate.len(), "skipping invalid candidate chain");
        }
    }

    match best {
        Some(winner) => (true, winner),
        None => (false, current),
    }
}
