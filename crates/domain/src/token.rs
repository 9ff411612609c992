use crate::ids::{Provider, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user, per-provider encrypted token record. Read-only from the
/// orchestrator's perspective — owned and written by the Token Store /
/// OAuth subsystem, which is out of scope for this crate.
///
/// Invariant: either `expires_at` is `None` (non-expiring) or the adapter
/// refreshes before use when `expires_at < now`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: UserId,
    pub provider: Provider,
    pub access_ciphertext: Vec<u8>,
    pub refresh_ciphertext: Option<Vec<u8>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// Decode the access ciphertext into the bearer string an adapter sends
    /// on the wire. Decryption at rest is the store implementation's
    /// concern (see `TOKEN_ENCRYPTION_KEY` in the config); by the time a
    /// caller holds a `TokenRecord` the bytes are the plaintext token.
    pub fn access_token(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.access_ciphertext.clone())
    }
}

/// Narrow read/write seam onto the external Token Store. The orchestrator
/// never implements cryptography beyond calling through this trait; a
/// production deployment backs it with a database and an opaque
/// encrypt/decrypt pair keyed by `TOKEN_ENCRYPTION_KEY`.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user: &UserId, provider: &Provider) -> Option<TokenRecord>;

    /// Persist a refreshed token (new ciphertexts + expiry). Adapters call
    /// this after performing their own refresh; the store never initiates
    /// a refresh itself.
    async fn put(&self, record: TokenRecord);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn non_expiring_token_is_never_expired() {
        let record = TokenRecord {
            user_id: UserId::from("u1"),
            provider: Provider::from("calendar"),
            access_ciphertext: vec![1, 2, 3],
            refresh_ciphertext: None,
            expires_at: None,
            scope: None,
        };
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn past_expiry_is_expired() {
        let record = TokenRecord {
            user_id: UserId::from("u1"),
            provider: Provider::from("calendar"),
            access_ciphertext: vec![],
            refresh_ciphertext: None,
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            scope: None,
        };
        assert!(record.is_expired(Utc::now()));
    }
}
