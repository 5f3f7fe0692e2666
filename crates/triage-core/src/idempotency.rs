use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// IdempotencyGate
// ---------------------------------------------------------------------------

/// Deduplicates webhook deliveries with short-lived locks.
///
/// `acquire` creates a lock entry if and only if the key is absent (or its
/// previous entry has expired) and reports whether this caller was first.
/// There is no unlock: entries self-expire and are swept lazily on later
/// acquires. One gate instance is constructed at process start and shared by
/// handle with every intake path.
pub struct IdempotencyGate {
    locks: Mutex<HashMap<String, Instant>>,
}

impl IdempotencyGate {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` for the first caller within the TTL window, `false` for
    /// every other caller while the lock is held. An empty key is
    /// non-lockable and always rejected.
    pub fn acquire(&self, key: &str, ttl: Duration) -> bool {
        if key.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut locks = self.locks.lock().expect("idempotency lock poisoned");
        locks.retain(|_, expires_at| *expires_at > now);

        match locks.get(key) {
            Some(_) => false,
            None => {
                locks.insert(key.to_string(), now + ttl);
                true
            }
        }
    }
}

impl Default for IdempotencyGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable SHA-256 hex digest of a request body, used as the fallback
/// idempotency key when the caller supplies none. Identical retransmissions
/// collapse to one admission even without an explicit key.
pub fn body_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquire_wins_second_loses() {
        let gate = IdempotencyGate::new();
        assert!(gate.acquire("k", Duration::from_secs(30)));
        assert!(!gate.acquire("k", Duration::from_secs(30)));
    }

    #[test]
    fn lock_expires_after_ttl() {
        let gate = IdempotencyGate::new();
        assert!(gate.acquire("k", Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(gate.acquire("k", Duration::from_millis(10)));
    }

    #[test]
    fn empty_key_always_rejected() {
        let gate = IdempotencyGate::new();
        assert!(!gate.acquire("", Duration::from_secs(30)));
        assert!(!gate.acquire("", Duration::from_secs(30)));
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let gate = IdempotencyGate::new();
        assert!(gate.acquire("a", Duration::from_secs(30)));
        assert!(gate.acquire("b", Duration::from_secs(30)));
    }

    #[test]
    fn body_hash_is_stable_sha256_hex() {
        let h = body_hash(b"{\"hello\":\"world\"}");
        assert_eq!(h.len(), 64);
        assert_eq!(h, body_hash(b"{\"hello\":\"world\"}"));
        assert_ne!(h, body_hash(b"{\"hello\":\"worlds\"}"));
    }
}
