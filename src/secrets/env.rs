//! Environment variable based secrets provider
//!
//! The default provider: secrets are environment variables, with .env
//! file support via dotenvy.

use super::*;

/// Default secrets provider that reads from environment variables.
///
/// This is the only place in the codebase where `dotenvy::dotenv()`,
/// `std::env::var()` and `std::env::vars()` are called. Everything else
/// goes through the `SecretsProvider` trait.
pub struct EnvSecretsProvider;

impl EnvSecretsProvider {
    /// Create a new environment-based secrets provider.
    ///
    /// Loads the .env file if one is present; a missing .env file is not
    /// an error.
    pub fn new() -> Self {
        let _ = dotenvy::dotenv();

        Self
    }
}

impl Default for EnvSecretsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SecretsProvider for EnvSecretsProvider {
    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        Ok(std::env::var(key).ok())
    }

    async fn get_all_secrets(&self) -> Result<HashMap<String, String>> {
        Ok(std::env::vars().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_provider_get_secret() {
        unsafe {
            std::env::set_var("GATEWAY_TEST_ENV_VAR", "test_value");
        }

        let provider = EnvSecretsProvider::new();
        let result = provider.get_secret("GATEWAY_TEST_ENV_VAR").await.unwrap();

        assert_eq!(result, Some("test_value".to_string()));

        unsafe {
            std::env::remove_var("GATEWAY_TEST_ENV_VAR");
        }
    }

    #[tokio::test]
    async fn test_env_provider_missing_secret() {
        let provider = EnvSecretsProvider::new();
        let result = provider.get_secret("GATEWAY_NONEXISTENT_VAR").await.unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_has_secret_rejects_empty_values() {
        unsafe {
            std::env::set_var("GATEWAY_EMPTY_SECRET", "");
        }

        let provider = EnvSecretsProvider::new();
        assert!(!provider.has_secret("GATEWAY_EMPTY_SECRET").await);

        unsafe {
            std::env::remove_var("GATEWAY_EMPTY_SECRET");
        }
    }
}
