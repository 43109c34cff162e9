use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::ID_SUFFIX_LEN;

/// Source of primary keys for segments and transforms
///
/// Ids are never checked against the store before use, so two generators
/// producing the same value in the same millisecond would collide.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Millisecond timestamp followed by a random alphanumeric suffix
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIds;

impl IdGenerator for TimestampIds {
    fn generate(&self) -> String {
        format!(
            "{}{}",
            chrono::Utc::now().timestamp_millis(),
            random_suffix(ID_SUFFIX_LEN)
        )
    }
}

/// Random string drawn from the 62-character alphanumeric alphabet
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Deterministic ids (`<prefix>1`, `<prefix>2`, ...) for tests
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_id_shape() {
        let id = TimestampIds.generate();
        let (stamp, suffix) = id.split_at(id.len() - ID_SUFFIX_LEN);

        assert!(stamp.parse::<i64>().is_ok(), "prefix should be a timestamp: {}", id);
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_timestamp_ids_differ() {
        let a = TimestampIds.generate();
        let b = TimestampIds.generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("seg");
        assert_eq!(ids.generate(), "seg1");
        assert_eq!(ids.generate(), "seg2");
    }
}
