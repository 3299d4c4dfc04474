use crate::credential::SelectorPolicy;
use anyhow::{Context, Result};
use generation::credentials::DEFAULT_API_KEY_VAR;
use generation::{BackendConfig, BackendType};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_API_BASE: &str = "LOGOMOTION_API_BASE";
pub const ENV_POLL_INTERVAL: &str = "LOGOMOTION_POLL_INTERVAL_SECS";
pub const ENV_BACKEND: &str = "LOGOMOTION_BACKEND";

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogomotionConfig {
    pub backend: BackendConfig,

    /// Environment variable holding the fallback API key
    pub api_key_var: String,

    pub selector_policy: SelectorPolicy,

    /// File name used when exporting the current animation
    pub export_file_name: String,
}

impl Default for LogomotionConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            api_key_var: DEFAULT_API_KEY_VAR.to_string(),
            selector_policy: SelectorPolicy::default(),
            export_file_name: "logomotion-export.mp4".to_string(),
        }
    }
}

impl LogomotionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write config {}", path.display()))?;
        Ok(())
    }

    /// Apply `LOGOMOTION_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.backend.api_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL} must be whole seconds, got '{raw}'"))?;
            anyhow::ensure!(secs > 0, "{ENV_POLL_INTERVAL} must be positive");
            self.backend.poll_interval_secs = secs;
        }
        if let Some(raw) = lookup(ENV_BACKEND) {
            self.backend.backend_type = match raw.trim().to_ascii_lowercase().as_str() {
                "gemini" => BackendType::Gemini,
                "mock" => BackendType::Mock,
                other => anyhow::bail!("{ENV_BACKEND}: unknown backend '{other}'"),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LogomotionConfig::default();
        assert_eq!(config.api_key_var, "API_KEY");
        assert_eq!(config.selector_policy, SelectorPolicy::AssumeSelected);
        assert_eq!(config.backend.poll_interval_secs, 5);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logomotion.json");
        let mut config = LogomotionConfig::default();
        config.selector_policy = SelectorPolicy::Reverify;
        config.backend.video_model = "veo-custom".to_string();
        config.save(&path).unwrap();

        let loaded = LogomotionConfig::load(&path).unwrap();
        assert_eq!(loaded.selector_policy, SelectorPolicy::Reverify);
        assert_eq!(loaded.backend.video_model, "veo-custom");
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = LogomotionConfig::load(Path::new("/nonexistent/logomotion.json")).unwrap_err();
        assert!(err.to_string().contains("read config"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_API_BASE, "http://localhost:8080"),
            (ENV_POLL_INTERVAL, "2"),
            (ENV_BACKEND, "Mock"),
        ]
        .into_iter()
        .collect();
        let mut config = LogomotionConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend.api_url, "http://localhost:8080");
        assert_eq!(config.backend.poll_interval_secs, 2);
        assert_eq!(config.backend.backend_type, BackendType::Mock);
    }

    #[test]
    fn test_invalid_poll_interval_rejected() {
        let mut config = LogomotionConfig::default();
        let result = config.apply_overrides(|name| {
            (name == ENV_POLL_INTERVAL).then(|| "soon".to_string())
        });
        assert!(result.is_err());
        let result = config.apply_overrides(|name| {
            (name == ENV_POLL_INTERVAL).then(|| "0".to_string())
        });
        assert!(result.is_err());
    }
}
