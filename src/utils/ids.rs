//! Identifier generation for sessions and messages.
//!
//! Identifiers combine the current Unix time in milliseconds with a short
//! random base36 suffix, so two ids minted in the same millisecond still
//! differ.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 7;

static FALLBACK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Session id of the form `session-<millis>-<suffix>`.
pub fn session_id() -> String {
    format!("session-{}-{}", Utc::now().timestamp_millis(), random_suffix())
}

/// Message id of the form `<millis>-<suffix>`.
pub fn message_id() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), random_suffix())
}

fn random_word() -> u64 {
    let mut bytes = [0u8; 8];
    if let Err(err) = getrandom::fill(&mut bytes) {
        tracing::debug!(error = %err, "OS randomness unavailable; using sequence suffix");
        let sequence = FALLBACK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_subsec_nanos() as u64;
        return sequence ^ (nanos << 8);
    }
    u64::from_le_bytes(bytes)
}

/// Base36 digits of one 64-bit draw. 36^7 is far below 2^64, so every
/// digit is close to uniform.
fn random_suffix() -> String {
    let mut value = random_word();
    (0..SUFFIX_LEN)
        .map(|_| {
            let digit = (value % BASE36.len() as u64) as usize;
            value /= BASE36.len() as u64;
            BASE36[digit] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn session_ids_follow_the_documented_shape() {
        let id = session_id();
        let parts: Vec<&str> = id.splitn(3, '-').collect();

        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn suffix_digits_cover_the_whole_alphabet() {
        let seen: HashSet<char> = (0..2000)
            .flat_map(|_| random_suffix().chars().collect::<Vec<_>>())
            .collect();
        assert_eq!(seen.len(), BASE36.len());
    }

    #[test]
    fn ids_minted_back_to_back_do_not_collide() {
        let ids: HashSet<String> = (0..500).map(|_| message_id()).collect();
        assert_eq!(ids.len(), 500);
    }
}
