//! Expiring cache of verified credentials.
//!
//! Entries are written after every successful verification and read only
//! when the auth service cannot be reached.

use super::Identity;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    identity: Identity,
    expires_at: Instant,
}

/// Credential → identity cache with a fixed time-to-live.
#[derive(Debug)]
pub struct CredentialCache {
    /// How long a verification stays usable.
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl CredentialCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Record a successful verification.
    pub fn insert(&mut self, credential: &str, identity: Identity) {
        self.insert_at(credential, identity, Instant::now());
    }

    fn insert_at(&mut self, credential: &str, identity: Identity, now: Instant) {
        self.entries.insert(
            credential.to_string(),
            Entry {
                identity,
                expires_at: now + self.ttl,
            },
        );
    }

    /// A still-valid identity for `credential`.
    pub fn get(&self, credential: &str) -> Option<Identity> {
        self.get_at(credential, Instant::now())
    }

    fn get_at(&self, credential: &str, now: Instant) -> Option<Identity> {
        self.entries
            .get(credential)
            .filter(|e| now < e.expires_at)
            .map(|e| e.identity.clone())
    }

    pub fn invalidate(&mut self, credential: &str) {
        self.entries.remove(credential);
    }

    /// Garbage-collect expired entries. Returns how many were removed.
    pub fn gc(&mut self) -> usize {
        self.gc_at(Instant::now())
    }

    fn gc_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| now < e.expires_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
