//! File-backed `TokenStore`: the key/value table of per-user, per-provider
//! access tokens the orchestrator reads from and writes refreshed tokens
//! back to. OAuth acquisition and at-rest encryption are a separate
//! subsystem's concern; by the time a `TokenRecord` reaches this store its
//! ciphertext fields already hold the bytes an adapter can send on the wire.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use vco_domain::ids::{Provider, UserId};
use vco_domain::token::{TokenRecord, TokenStore};

#[derive(serde::Serialize, serde::Deserialize, Clone)]
struct StoredRecord {
    access: Vec<u8>,
    refresh: Option<Vec<u8>>,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    scope: Option<String>,
}

fn key(user: &UserId, provider: &Provider) -> String {
    format!("{}:{}", user.0, provider.0)
}

/// Loads `tokens.json` under the workspace state directory at startup and
/// flushes it back on every `put`. Single in-memory map guarded by one
/// lock, matching the rest of this codebase's small-state-file stores.
pub struct FileTokenStore {
    path: PathBuf,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl FileTokenStore {
    pub fn new(state_dir: &Path) -> vco_domain::Result<Self> {
        let path = state_dir.join("tokens.json");
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(vco_domain::Error::Io)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, records: RwLock::new(records) })
    }

    fn flush(&self) -> vco_domain::Result<()> {
        let records = self.records.read();
        let json = serde_json::to_string_pretty(&*records)?;
        std::fs::write(&self.path, json).map_err(vco_domain::Error::Io)
    }

    /// Count of distinct providers with a token for `user` — used to decide
    /// whether the registry snapshot has anything to discover for them.
    pub fn provider_count_for(&self, user: &UserId) -> usize {
        let prefix = format!("{}:", user.0);
        self.records.read().keys().filter(|k| k.starts_with(&prefix)).count()
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, user: &UserId, provider: &Provider) -> Option<TokenRecord> {
        let stored = self.records.read().get(&key(user, provider)).cloned()?;
        Some(TokenRecord {
            user_id: user.clone(),
            provider: provider.clone(),
            access_ciphertext: stored.access,
            refresh_ciphertext: stored.refresh,
            expires_at: stored.expires_at,
            scope: stored.scope,
        })
    }

    async fn put(&self, record: TokenRecord) {
        let k = key(&record.user_id, &record.provider);
        self.records.write().insert(
            k,
            StoredRecord {
                access: record.access_ciphertext,
                refresh: record.refresh_ciphertext,
                expires_at: record.expires_at,
                scope: record.scope,
            },
        );
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to flush token store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path()).unwrap();
        let user = UserId::from("u1");
        let provider = Provider::from("calendar");

        store
            .put(TokenRecord {
                user_id: user.clone(),
                provider: provider.clone(),
                access_ciphertext: b"token-123".to_vec(),
                refresh_ciphertext: None,
                expires_at: None,
                scope: None,
            })
            .await;

        let fetched = store.get(&user, &provider).await.unwrap();
        assert_eq!(fetched.access_ciphertext, b"token-123");
    }

    #[tokio::test]
    async fn unknown_provider_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path()).unwrap();
        let got = store.get(&UserId::from("u1"), &Provider::from("chat")).await;
        assert!(got.is_none());
    }

    #[test]
    fn provider_count_is_scoped_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path()).unwrap();
        store.records.write().insert(
            key(&UserId::from("u1"), &Provider::from("calendar")),
            StoredRecord { access: vec![], refresh: None, expires_at: None, scope: None },
        );
        store.records.write().insert(
            key(&UserId::from("u2"), &Provider::from("chat")),
            StoredRecord { access: vec![], refresh: None, expires_at: None, scope: None },
        );
        assert_eq!(store.provider_count_for(&UserId::from("u1")), 1);
        assert_eq!(store.provider_count_for(&UserId::from("u3")), 0);
    }
}
