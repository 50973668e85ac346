//! Short-lived, single-read storage for finished cards.
//!
//! A card is stashed under a random token and handed back exactly once.
//! Entries that are never collected expire after a TTL and are swept on the
//! next access, so an abandoned card does not linger in memory.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use uuid::Uuid;

use crate::card::EvidenceCard;

/// How long an unread card survives.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// An in-memory card store with single-read semantics.
#[derive(Debug)]
pub struct CardStash {
    ttl: Duration,
    entries: Mutex<HashMap<String, StashEntry>>,
}

#[derive(Debug)]
struct StashEntry {
    card: EvidenceCard,
    stored_at: Instant,
}

impl CardStash {
    /// Create a stash whose unread entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a card and return the token that retrieves it.
    pub fn put(&self, card: EvidenceCard) -> String {
        let token = Uuid::new_v4().to_string();
        let mut entries = self.entries.lock().expect("lock poisoned");
        Self::sweep(&mut entries, self.ttl);
        entries.insert(
            token.clone(),
            StashEntry {
                card,
                stored_at: Instant::now(),
            },
        );
        token
    }

    /// Retrieve and remove the card for `token`.
    ///
    /// Returns `None` for unknown tokens, expired entries, and tokens that
    /// were already collected. A second call with the same token always
    /// returns `None`.
    pub fn take(&self, token: &str) -> Option<EvidenceCard> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        Self::sweep(&mut entries, self.ttl);
        entries.remove(token).map(|entry| entry.card)
    }

    fn sweep(entries: &mut HashMap<String, StashEntry>, ttl: Duration) {
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
    }
}

impl Default for CardStash {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
