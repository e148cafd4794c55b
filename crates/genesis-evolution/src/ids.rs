//! Fixed-width identifiers for insights and proposals.
//!
//! An id is the SHA-256 of `base + nanosecond timestamp + process-wide sequence`,
//! hex-encoded and truncated to [`ID_WIDTH`] characters. The sequence makes ids
//! generated within the same clock tick distinct.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

pub const ID_WIDTH: usize = 16;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub fn generate_id(base: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(format!("{}_{}_{}", base, nanos, seq).as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_WIDTH);
    id
}

pub fn insight_id(insight_type: &str) -> String {
    generate_id(&format!("insight_{}", insight_type))
}

pub fn proposal_id(title: &str) -> String {
    generate_id(&format!("proposal_{}", title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fixed_width_hex() {
        let id = proposal_id("interaction_improvement: low_user_satisfaction");
        assert_eq!(id.len(), ID_WIDTH);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ten_thousand_ids_same_base_are_unique() {
        let ids: HashSet<String> = (0..10_000).map(|_| proposal_id("same-title")).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..2_500).map(|_| insight_id("t")).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 10_000);
    }
}
