/// Where the provider API key comes from.
///
/// Backends read the key through an [`ApiKeySource`] on every request, so a
/// key selected mid-session is used by the next call without rebuilding the
/// backend.

use parking_lot::RwLock;
use std::sync::Arc;

pub const DEFAULT_API_KEY_VAR: &str = "API_KEY";

pub trait ApiKeySource: Send + Sync {
    /// Current key, or `None` when nothing usable is configured.
    fn api_key(&self) -> Option<String>;
}

/// Key read from an environment variable at call time
#[derive(Debug, Clone)]
pub struct EnvApiKey {
    var: String,
}

impl EnvApiKey {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvApiKey {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY_VAR)
    }
}

impl ApiKeySource for EnvApiKey {
    fn api_key(&self) -> Option<String> {
        std::env::var(&self.var).ok().and_then(non_empty)
    }
}

#[derive(Debug, Clone)]
pub struct StaticApiKey(String);

impl StaticApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl ApiKeySource for StaticApiKey {
    fn api_key(&self) -> Option<String> {
        non_empty(self.0.clone())
    }
}

/// Key slot a host-side selector can fill or replace while the session runs
#[derive(Debug, Clone, Default)]
pub struct SharedApiKey {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedApiKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>) {
        *self.inner.write() = Some(key.into());
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl ApiKeySource for SharedApiKey {
    fn api_key(&self) -> Option<String> {
        self.inner.read().clone().and_then(non_empty)
    }
}

fn non_empty(key: String) -> Option<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_key_ignores_blank() {
        assert_eq!(StaticApiKey::new("  ").api_key(), None);
        assert_eq!(StaticApiKey::new(" abc ").api_key(), Some("abc".to_string()));
    }

    #[test]
    fn test_shared_key_updates_are_visible() {
        let shared = SharedApiKey::new();
        let reader = shared.clone();
        assert_eq!(reader.api_key(), None);
        shared.set("key-1");
        assert_eq!(reader.api_key(), Some("key-1".to_string()));
        shared.clear();
        assert_eq!(reader.api_key(), None);
    }

    #[test]
    fn test_env_key_missing_var() {
        let source = EnvApiKey::new("LOGOMOTION_TEST_KEY_THAT_IS_NEVER_SET");
        assert_eq!(source.api_key(), None);
    }
}
