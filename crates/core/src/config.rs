//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Image storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for generated images.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/images"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        /// Logs warnings for queries exceeding this duration.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/novelai.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Image provider (NovelAI) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Bearer token for the provider API.
    /// WARNING: Prefer ATELIER_PROVIDER__API_KEY over storing it in config files.
    #[serde(default)]
    pub api_key: String,
    /// Image generation endpoint.
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Request timeout in seconds. Generation is slow.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_endpoint() -> String {
    "https://image.novelai.net/ai/generate-image".to_string()
}

fn default_provider_model() -> String {
    "nai-diffusion-4-5-full".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_provider_endpoint(),
            model: default_provider_model(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Human-verification (Turnstile) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Shared secret for the verifier. Unset or empty disables verification.
    #[serde(default)]
    pub secret: Option<String>,
    /// Siteverify endpoint.
    #[serde(default = "default_verification_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds.
    #[serde(default = "default_verification_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_verification_endpoint() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
}

fn default_verification_timeout_secs() -> u64 {
    10
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            secret: None,
            endpoint: default_verification_endpoint(),
            timeout_secs: default_verification_timeout_secs(),
        }
    }
}

impl VerificationConfig {
    /// The configured secret, if verification is enabled.
    pub fn enabled_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Admission control configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Minimum seconds between any two admitted requests.
    #[serde(default = "default_global_interval_secs")]
    pub global_interval_secs: u64,
    /// Minimum seconds between two admitted requests from one client.
    #[serde(default = "default_client_interval_secs")]
    pub client_interval_secs: u64,
    /// Seconds a successful verification stays valid for a client.
    #[serde(default = "default_verification_interval_secs")]
    pub verification_interval_secs: u64,
    /// Idle seconds after which a client entry is evicted by the sweep.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Interval in seconds between ledger sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Shared key that bypasses every admission gate. Unset or empty disables bypass.
    #[serde(default)]
    pub privilege_key: Option<String>,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP headers trusted.
    /// If empty, forwarded headers are never trusted (only direct connection IP is used).
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

fn default_global_interval_secs() -> u64 {
    10
}

fn default_client_interval_secs() -> u64 {
    30
}

fn default_verification_interval_secs() -> u64 {
    60
}

fn default_retention_secs() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global_interval_secs: default_global_interval_secs(),
            client_interval_secs: default_client_interval_secs(),
            verification_interval_secs: default_verification_interval_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            privilege_key: None,
            trusted_proxies: Vec::new(),
        }
    }
}

impl AdmissionConfig {
    pub fn global_interval(&self) -> Duration {
        Duration::from_secs(self.global_interval_secs)
    }

    pub fn client_interval(&self) -> Duration {
        Duration::from_secs(self.client_interval_secs)
    }

    pub fn verification_interval(&self) -> Duration {
        Duration::from_secs(self.verification_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// The configured privilege key, if bypass is enabled.
    pub fn enabled_privilege_key(&self) -> Option<&str> {
        self.privilege_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Validate admission configuration for dangerous settings.
    /// Returns warnings for configs that are insecure but allowed,
    /// and errors for configs that are unsafe and should be rejected.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        // Error on zero sweep interval (would cause tokio::time::interval to panic)
        if self.sweep_interval_secs == 0 {
            return Err("admission.sweep_interval_secs cannot be 0. \
                 Use a value >= 1 second."
                .to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "admission.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 This allows clients to spoof their IP address and bypass throttles. \
                 Only use this setting in development or behind a trusted reverse proxy."
                    .to_string(),
            );
        }

        if self.global_interval_secs == 0 && self.client_interval_secs == 0 {
            warnings.push(
                "admission.global_interval_secs and admission.client_interval_secs are both 0. \
                 Generation requests are not throttled."
                    .to_string(),
            );
        }

        // Entries evicted before their throttle window ends would reset the window.
        let longest_window = self
            .client_interval_secs
            .max(self.verification_interval_secs);
        if self.retention_secs < longest_window {
            warnings.push(format!(
                "admission.retention_secs={} is shorter than the longest admission window ({}s). \
                 Clients may be evicted before their throttle or verification window expires.",
                self.retention_secs, longest_window
            ));
        }

        Ok(warnings)
    }
}

/// A style preset seeded into the metadata store at startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StylePresetConfig {
    /// Unique preset name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prefix_prompt: String,
    #[serde(default)]
    pub suffix_prompt: String,
    #[serde(default)]
    pub prefix_negative_prompt: String,
    #[serde(default)]
    pub suffix_negative_prompt: String,
    #[serde(default = "default_preset_enabled")]
    pub enabled: bool,
}

fn default_preset_enabled() -> bool {
    true
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Image storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Image provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Human-verification configuration.
    #[serde(default)]
    pub verification: VerificationConfig,
    /// Admission control configuration.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Style presets to seed at startup.
    #[serde(default)]
    pub style_presets: Vec<StylePresetConfig>,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses a dummy provider key and leaves
    /// verification disabled.
    pub fn for_testing() -> Self {
        Self {
            provider: ProviderConfig {
                api_key: "test-provider-key".to_string(),
                ..ProviderConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate the whole configuration.
    /// Returns warnings to log on success, or the first fatal error.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        if self.provider.api_key.trim().is_empty() {
            return Err("provider.api_key is required \
                 (set ATELIER_PROVIDER__API_KEY)"
                .to_string());
        }
        if self.provider.timeout_secs == 0 {
            return Err("provider.timeout_secs cannot be 0".to_string());
        }
        if self.verification.timeout_secs == 0 {
            return Err("verification.timeout_secs cannot be 0".to_string());
        }

        let mut warnings = self.admission.validate()?;

        if self.verification.enabled_secret().is_none() {
            warnings.push(
                "verification.secret is not set. Human verification is disabled \
                 and every client passes the challenge gate."
                    .to_string(),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for preset in &self.style_presets {
            if preset.name.trim().is_empty() {
                return Err("style_presets entries require a non-empty name".to_string());
            }
            if !seen.insert(preset.name.as_str()) {
                return Err(format!("duplicate style preset name: {}", preset.name));
            }
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_config_defaults() {
        let config = AdmissionConfig::default();
        assert_eq!(config.global_interval(), Duration::from_secs(10));
        assert_eq!(config.client_interval(), Duration::from_secs(30));
        assert_eq!(config.verification_interval(), Duration::from_secs(60));
        assert_eq!(config.retention(), Duration::from_secs(86400));
        assert!(config.enabled_privilege_key().is_none());
    }

    #[test]
    fn test_admission_config_deserialize_partial() {
        let json = r#"{"client_interval_secs": 5, "privilege_key": "letmein"}"#;
        let config: AdmissionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.client_interval_secs, 5);
        assert_eq!(config.global_interval_secs, 10);
        assert_eq!(config.enabled_privilege_key(), Some("letmein"));
    }

    #[test]
    fn test_empty_privilege_key_is_disabled() {
        let config = AdmissionConfig {
            privilege_key: Some(String::new()),
            ..AdmissionConfig::default()
        };
        assert!(config.enabled_privilege_key().is_none());
    }

    #[test]
    fn test_empty_verification_secret_is_disabled() {
        let config = VerificationConfig {
            secret: Some(String::new()),
            ..VerificationConfig::default()
        };
        assert!(config.enabled_secret().is_none());
    }

    #[test]
    fn test_admission_validate_rejects_zero_sweep_interval() {
        let config = AdmissionConfig {
            sweep_interval_secs: 0,
            ..AdmissionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admission_validate_warns_on_wildcard_proxy() {
        let config = AdmissionConfig {
            trusted_proxies: vec!["*".to_string()],
            ..AdmissionConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("trusted_proxies")));
    }

    #[test]
    fn test_app_config_requires_api_key() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.contains("provider.api_key"));

        assert!(AppConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_app_config_rejects_duplicate_presets() {
        let mut config = AppConfig::for_testing();
        let preset = StylePresetConfig {
            name: "anime".to_string(),
            ..StylePresetConfig::default()
        };
        config.style_presets = vec![preset.clone(), preset];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_deserialize_filesystem() {
        let json = r#"{"type":"filesystem","path":"/srv/images"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        match config {
            StorageConfig::Filesystem { path } => {
                assert_eq!(path, PathBuf::from("/srv/images"));
            }
        }
    }

    #[test]
    fn test_preset_config_defaults_enabled() {
        let json = r#"{"name":"anime","prefix_prompt":"masterpiece"}"#;
        let preset: StylePresetConfig = serde_json::from_str(json).unwrap();
        assert!(preset.enabled);
        assert_eq!(preset.suffix_prompt, "");
    }
}
