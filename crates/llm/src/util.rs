//! Shared utility functions for provider adapters.

use vco_domain::config::AuthConfig;
use vco_domain::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    Error::Http(e.to_string())
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence: plaintext `key` field, then `env` var. A missing key is a
/// configuration error, not a runtime one — it's caught at provider
/// construction time.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        return Ok(key.clone());
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var)
            .map_err(|_| Error::Config(format!("environment variable '{env_var}' not set or not valid UTF-8")));
    }

    Err(Error::Config("no API key configured: set 'key' or 'env' in AuthConfig".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_plaintext() {
        let auth = AuthConfig { key: Some("sk-test-123".into()), ..Default::default() };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
    }

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "VCO_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig { env: Some(var_name.into()), ..Default::default() };
        assert_eq!(resolve_api_key(&auth).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing() {
        let auth = AuthConfig { env: Some("VCO_TEST_NONEXISTENT_VAR_8888".into()), ..Default::default() };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("VCO_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn resolve_api_key_no_config() {
        let err = resolve_api_key(&AuthConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn resolve_api_key_plaintext_takes_precedence_over_env() {
        let auth = AuthConfig { key: Some("plaintext-wins".into()), env: Some("VCO_TEST_SHOULD_NOT_BE_READ".into()), ..Default::default() };
        assert_eq!(resolve_api_key(&auth).unwrap(), "plaintext-wins");
    }
}
