//! HTTP-01 challenge token store
//!
//! Holds pending challenge proofs so the HTTP responder can serve them at
//! `/.well-known/acme-challenge/<token>` while the ACME client drives
//! validation.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Capability handed to the ACME client for publishing challenge proofs.
///
/// The client calls [`present`](Self::present) before telling the CA a
/// challenge is ready and [`clean_up`](Self::clean_up) once validation has
/// finished, whatever the result.
pub trait ChallengeResponder: Send + Sync {
    /// Publish `proof` under `token`, replacing any previous value
    fn present(&self, token: &str, proof: &str);

    /// Withdraw `token`; unknown tokens are ignored
    fn clean_up(&self, token: &str);
}

/// Concurrent token → proof map.
///
/// # Thread Safety
///
/// Guarded by a reader/writer lock: any number of HTTP handlers may look up
/// tokens at once, while `present` and `clean_up` take the lock exclusively.
/// The lock is held only for the map operation itself and a lookup returns
/// an owned copy of the proof, so no guard ever outlives the call.
#[derive(Debug, Clone, Default)]
pub struct ChallengeStore {
    challenges: Arc<RwLock<HashMap<String, String>>>,
}

impl ChallengeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `proof` under `token`, silently overwriting a previous entry
    pub fn present(&self, token: &str, proof: &str) {
        let replaced = self
            .challenges
            .write()
            .insert(token.to_string(), proof.to_string())
            .is_some();
        debug!(token = %token, replaced, "Presenting HTTP-01 challenge");
    }

    /// Remove `token` if present
    pub fn clean_up(&self, token: &str) {
        if self.challenges.write().remove(token).is_some() {
            debug!(token = %token, "Cleaned up HTTP-01 challenge");
        }
    }

    /// Look up the proof for `token`
    pub fn lookup(&self, token: &str) -> Option<String> {
        let proof = self.challenges.read().get(token).cloned();
        trace!(token = %token, found = proof.is_some(), "HTTP-01 challenge lookup");
        proof
    }

    /// Number of tokens currently presented
    pub fn pending_count(&self) -> usize {
        self.challenges.read().len()
    }
}

impl ChallengeResponder for ChallengeStore {
    fn present(&self, token: &str, proof: &str) {
        ChallengeStore::present(self, token, proof);
    }

    fn clean_up(&self, token: &str) {
        ChallengeStore::clean_up(self, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_present_and_lookup() {
        let store = ChallengeStore::new();

        store.present("test-token", "test-token.thumbprint");

        assert_eq!(
            store.lookup("test-token"),
            Some("test-token.thumbprint".to_string())
        );
    }

    #[test]
    fn test_lookup_unknown_token() {
        let store = ChallengeStore::new();
        assert_eq!(store.lookup("nonexistent"), None);
    }

    #[test]
    fn test_present_overwrites() {
        let store = ChallengeStore::new();

        store.present("token", "first");
        store.present("token", "second");

        assert_eq!(store.lookup("token"), Some("second".to_string()));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn test_clean_up() {
        let store = ChallengeStore::new();

        store.present("token", "proof");
        store.clean_up("token");

        assert_eq!(store.lookup("token"), None);
        assert_eq!(store.pending_count(), 0);

        // Unknown tokens are a no-op
        store.clean_up("token");
        store.clean_up("never-presented");
    }

    #[test]
    fn test_clone_shares_state() {
        let store1 = ChallengeStore::new();
        let store2 = store1.clone();

        store1.present("token", "proof");

        assert_eq!(store2.lookup("token"), Some("proof".to_string()));
    }

    #[test]
    fn test_responder_capability() {
        let store = ChallengeStore::new();
        let responder: Arc<dyn ChallengeResponder> = Arc::new(store.clone());

        responder.present("token", "proof");
        assert_eq!(store.lookup("token"), Some("proof".to_string()));

        responder.clean_up("token");
        assert_eq!(store.lookup("token"), None);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let store = ChallengeStore::new();

        // A token every reader can rely on throughout the test
        let stable_proof = "s".repeat(4096);
        store.present("stable", &stable_proof);

        let writers: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    let token = format!("token-{}", i);
                    let proof = format!("{}", i).repeat(1024);
                    for _ in 0..200 {
                        store.present(&token, &proof);
                        store.clean_up(&token);
                    }
                    store.present(&token, &proof);
                })
            })
            .collect();

        let readers: Vec<_> = (0..100)
            .map(|r| {
                let store = store.clone();
                let stable_proof = stable_proof.clone();
                thread::spawn(move || {
                    for n in 0..200 {
                        assert_eq!(store.lookup("stable").as_deref(), Some(stable_proof.as_str()));

                        let i = (r + n) % 10;
                        if let Some(proof) = store.lookup(&format!("token-{}", i)) {
                            // Never a partially written value
                            assert_eq!(proof, format!("{}", i).repeat(1024));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert_eq!(store.pending_count(), 11);
        for i in 0..10 {
            assert_eq!(
                store.lookup(&format!("token-{}", i)),
                Some(format!("{}", i).repeat(1024))
            );
        }
    }
}
