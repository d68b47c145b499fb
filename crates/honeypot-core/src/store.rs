//! Session persistence: durable Sled store with a volatile in-memory fallback.
//!
//! Keys are `honeypot:session:<session_id>`. Values are the JSON-serialized
//! [`SessionMemory`] wrapped in an envelope carrying an expiry timestamp;
//! Sled has no native TTL, so expired records are treated as absent on load
//! and deleted lazily. Every save refreshes the TTL.
//!
//! Consistency note: turns for the same session are not serialized here.
//! Two concurrent turns can both load the same prior state and the later
//! write wins. Accepted as last-write-wins (see DESIGN.md).

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::HoneypotError;
use crate::models::SessionMemory;

fn session_key(session_id: &str) -> String {
    format!("honeypot:session:{session_id}")
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    expires_at: i64,
    session: SessionMemory,
}

impl StoredSession {
    fn wrap(session: &SessionMemory, ttl_secs: u64) -> Self {
        Self {
            expires_at: chrono::Utc::now().timestamp() + ttl_secs as i64,
            session: session.clone(),
        }
    }

    fn expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at
    }
}

/// Pluggable session persistence. The gateway selects the Sled-backed store
/// at startup and falls back to the in-memory store if the database cannot
/// be opened.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session. `Ok(None)` when absent or expired.
    async fn load(&self, session_id: &str) -> Result<Option<SessionMemory>, HoneypotError>;

    /// Save a session, refreshing its TTL.
    async fn save(&self, session: &SessionMemory) -> Result<(), HoneypotError>;

    /// Health-probe label: `"connected"` for durable storage, `"fallback"`
    /// for the volatile map.
    fn mode(&self) -> &'static str;
}

/// Durable store on an embedded Sled database.
pub struct SledSessionStore {
    db: sled::Db,
    ttl_secs: u64,
}

impl SledSessionStore {
    pub fn open<P: AsRef<Path>>(path: P, ttl_secs: u64) -> Result<Self, HoneypotError> {
        let db = sled::open(path)?;
        Ok(Self { db, ttl_secs })
    }
}

#[async_trait]
impl SessionStore for SledSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionMemory>, HoneypotError> {
        let key = session_key(session_id);
        let Some(raw) = self.db.get(key.as_bytes())? else {
            return Ok(None);
        };
        let stored: StoredSession = match serde_json::from_slice(&raw) {
            Ok(s) => s,
            Err(e) => {
                // Corrupt record: drop it and start the session over.
                tracing::warn!(session_id, error = %e, "dropping unreadable session record");
                let _ = self.db.remove(key.as_bytes());
                return Ok(None);
            }
        };
        if stored.expired() {
            let _ = self.db.remove(key.as_bytes());
            return Ok(None);
        }
        Ok(Some(stored.session))
    }

    async fn save(&self, session: &SessionMemory) -> Result<(), HoneypotError> {
        let key = session_key(&session.session_id);
        let stored = StoredSession::wrap(session, self.ttl_secs);
        let raw = serde_json::to_vec(&stored)?;
        self.db.insert(key.as_bytes(), raw)?;
        Ok(())
    }

    fn mode(&self) -> &'static str {
        "connected"
    }
}

/// Volatile in-process store. Loses all sessions on restart and is not
/// shared across processes; used only when Sled cannot be opened, and in
/// tests.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, StoredSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionMemory>, HoneypotError> {
        let key = session_key(session_id);
        if let Some(stored) = self.sessions.get(&key) {
            if !stored.expired() {
                return Ok(Some(stored.session.clone()));
            }
        }
        self.sessions.remove(&key);
        Ok(None)
    }

    async fn save(&self, session: &SessionMemory) -> Result<(), HoneypotError> {
        let key = session_key(&session.session_id);
        // The volatile store has no eviction; a long TTL is fine for its
        // degraded-mode lifetime.
        self.sessions
            .insert(key, StoredSession::wrap(session, 3600));
        Ok(())
    }

    fn mode(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sled_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledSessionStore::open(dir.path(), 3600).unwrap();

        assert!(store.load("nope").await.unwrap().is_none());

        let mut mem = SessionMemory::new("s1");
        mem.scam_detected = true;
        store.save(&mem).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert!(loaded.scam_detected);
        assert_eq!(store.mode(), "connected");
    }

    #[tokio::test]
    async fn sled_expired_records_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledSessionStore::open(dir.path(), 0).unwrap();
        store.save(&SessionMemory::new("s1")).await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySessionStore::new();
        store.save(&SessionMemory::new("s1")).await.unwrap();
        assert!(store.load("s1").await.unwrap().is_some());
        assert!(store.load("other").await.unwrap().is_none());
        assert_eq!(store.mode(), "fallback");
    }

    #[tokio::test]
    async fn last_write_wins_for_same_session() {
        let store = MemorySessionStore::new();
        let mut a = SessionMemory::new("s1");
        a.message_count = 1;
        let mut b = SessionMemory::new("s1");
        b.message_count = 5;
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap().unwrap().message_count, 5);
    }
}
