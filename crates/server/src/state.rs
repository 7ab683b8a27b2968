//! Application state shared across handlers.

use crate::admission::AdmissionController;
use crate::client_ip::ClientIpExtractor;
use crate::ledger::AdmissionLedger;
use crate::provider::GenerationOrchestrator;
use crate::recorder::OutcomeRecorder;
use crate::verification::{ChallengeVerifier, TurnstileVerifier};
use atelier_core::config::AppConfig;
use atelier_core::{Clock, SystemClock};
use atelier_metadata::MetadataStore;
use atelier_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Image file store.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Admission bookkeeping, shared with the sweep task.
    pub ledger: AdmissionLedger,
    pub admission: Arc<AdmissionController>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub recorder: Arc<OutcomeRecorder>,
    pub client_ip: Arc<ClientIpExtractor>,
}

impl AppState {
    /// Create the application state with the Turnstile verifier and the
    /// system clock.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails with an error.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self, reqwest::Error> {
        let verifier = Arc::new(TurnstileVerifier::new(&config.verification)?);
        Self::with_components(config, storage, metadata, verifier, Arc::new(SystemClock))
    }

    /// Create the application state with an explicit verifier and clock.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails with an error.
    pub fn with_components(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        verifier: Arc<dyn ChallengeVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        // Fail fast on errors, log warnings
        match config.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("Configuration warning: {}", warning);
                }
            }
            Err(error) => {
                panic!("Invalid configuration: {}", error);
            }
        }

        let ledger = AdmissionLedger::new(&config.admission, clock);
        let admission = AdmissionController::new(&config.admission, ledger.clone(), verifier);
        let orchestrator = GenerationOrchestrator::new(&config.provider)?;
        let recorder = OutcomeRecorder::new(storage.clone(), metadata.clone());
        let client_ip = ClientIpExtractor::new(&config.admission.trusted_proxies);

        Ok(Self {
            config: Arc::new(config),
            storage,
            metadata,
            ledger,
            admission: Arc::new(admission),
            orchestrator: Arc::new(orchestrator),
            recorder: Arc::new(recorder),
            client_ip: Arc::new(client_ip),
        })
    }

    /// Interval of the ledger sweep task.
    pub fn ledger_sweep_interval(&self) -> Duration {
        self.config.admission.sweep_interval()
    }

    /// How long an idle client stays in the ledger.
    pub fn ledger_retention(&self) -> Duration {
        self.config.admission.retention()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_metadata::SqliteStore;
    use atelier_storage::FilesystemBackend;
    use tempfile::tempdir;

    async fn build_state(config: AppConfig) -> (tempfile::TempDir, AppState) {
        let temp = tempdir().unwrap();
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(temp.path().join("images")).await.unwrap());

        let db_path = temp.path().join("novelai.db");
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(&db_path, None).await.unwrap());

        let state = AppState::new(config, storage, metadata).unwrap();
        (temp, state)
    }

    #[tokio::test]
    async fn sweep_settings_follow_config() {
        let mut config = AppConfig::for_testing();
        config.admission.sweep_interval_secs = 12;
        config.admission.retention_secs = 600;

        let (_temp, state) = build_state(config).await;
        assert_eq!(state.ledger_sweep_interval(), Duration::from_secs(12));
        assert_eq!(state.ledger_retention(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn ledger_is_shared_with_admission() {
        let (_temp, state) = build_state(AppConfig::for_testing()).await;
        state.ledger.record_request("1.2.3.4");
        assert!(state.admission.ledger().client_state("1.2.3.4").is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "Invalid configuration")]
    async fn invalid_config_panics() {
        let mut config = AppConfig::for_testing();
        config.provider.api_key = String::new();
        let _ = build_state(config).await;
    }
}
