//! Bearer token sources.

use crate::error::{Result, SceneError};
use crate::ports::auth::TokenProvider;
use async_trait::async_trait;

/// A fixed token, for scripts and tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn current_token(&self) -> Result<String> {
        if self.token.trim().is_empty() {
            return Err(SceneError::Auth("no token configured".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every call, so a token
/// rotated by an external helper is picked up at the next authenticated step.
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub const DEFAULT_VAR: &'static str = "SPLATLINE_TOKEN";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn current_token(&self) -> Result<String> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(SceneError::Auth(format!("{} is not set", self.var))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.current_token().await.unwrap(), "abc");

        let empty = StaticTokenProvider::new("");
        assert!(empty.current_token().await.unwrap_err().requires_reauth());
    }

    #[tokio::test]
    async fn test_env_token_is_reread_each_call() {
        let var = "SPLATLINE_TEST_TOKEN_ROTATION";
        let provider = EnvTokenProvider::new(var);

        std::env::remove_var(var);
        assert!(provider.current_token().await.is_err());

        std::env::set_var(var, "first");
        assert_eq!(provider.current_token().await.unwrap(), "first");

        std::env::set_var(var, "second");
        assert_eq!(provider.current_token().await.unwrap(), "second");
        std::env::remove_var(var);
    }
}
