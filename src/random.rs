//! Salted deterministic selection.
//!
//! Everything a group sees twice (question wording, media, voter order,
//! weekly trigger time) is derived from SHA-256 over the item and a salt, so
//! a conversation replays identically from its persisted record. Only the
//! salt itself and throwaway confirmation texts come from a real RNG.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::ops::Range;
use std::time::Duration;

/// Lowercase hex SHA-256 of the concatenated `parts`.
#[must_use]
pub fn sha256_hex<S: AsRef<[u8]>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    format!("{:x}", hasher.finalize())
}

/// Deterministic permutation of `items` keyed by `salt`.
///
/// Items are ordered by `sha256(item || salt)`. Equal keys keep input order.
#[must_use]
pub fn shuffle<T: Display + Clone>(items: &[T], salt: &str) -> Vec<T> {
    let mut keyed: Vec<(String, &T)> = items
        .iter()
        .map(|item| (sha256_hex(&[item.to_string().as_str(), salt]), item))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

/// Round-robin pick through successive salted permutations.
///
/// Index `i` selects position `i % n` of the permutation for round `i / n`,
/// so each block of `n` consecutive indices (aligned to `n`) yields every
/// item exactly once. Returns `None` for an empty slice.
#[must_use]
pub fn pick<T: Display + Clone>(items: &[T], index: u64, salt: &str) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let n = items.len() as u64;
    let round = index / n;
    let offset = (index % n) as usize;
    shuffle(items, &format!("{round};{salt}"))
        .into_iter()
        .nth(offset)
}

/// 32 random bytes, hex encoded. Used as a fresh per-conversation salt.
#[must_use]
pub fn random_hex256() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Uniform, non-reproducible choice.
#[must_use]
pub fn pick_random<T>(items: &[T]) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    items.get(rand::thread_rng().gen_range(0..items.len()))
}

/// Uniform duration in `range` (whole seconds). Empty ranges yield `range.start`.
#[must_use]
pub fn random_duration(range: Range<Duration>) -> Duration {
    let lo = range.start.as_secs();
    let hi = range.end.as_secs();
    if hi <= lo {
        return range.start;
    }
    Duration::from_secs(rand::thread_rng().gen_range(lo..hi))
}
