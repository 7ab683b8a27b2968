//! Server test utilities.

use atelier_core::ManualClock;
use atelier_core::config::{AppConfig, MetadataConfig, StorageConfig};
use atelier_metadata::{MetadataStore, SqliteStore};
use atelier_server::bootstrap::seed_style_presets;
use atelier_server::verification::{ChallengeVerifier, StaticVerifier};
use atelier_server::{AppState, create_router};
use atelier_storage::{FilesystemBackend, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub image_root: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Server that talks to `provider_endpoint` with throttling switched off
    /// and every challenge accepted.
    pub async fn new(provider_endpoint: &str) -> Self {
        Self::build(provider_endpoint, Arc::new(StaticVerifier(true)), |config| {
            config.admission.global_interval_secs = 0;
            config.admission.client_interval_secs = 0;
        })
        .await
    }

    /// Server with a custom verifier and configuration tweaks.
    pub async fn build(
        provider_endpoint: &str,
        verifier: Arc<dyn ChallengeVerifier>,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let image_root = temp_dir.path().join("images");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&image_root)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("novelai.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: image_root.clone(),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        config.provider.endpoint = provider_endpoint.to_string();
        config.provider.timeout_secs = 5;
        configure(&mut config);

        seed_style_presets(metadata.as_ref(), &config.style_presets)
            .await
            .expect("Failed to seed style presets");
        atelier_server::metrics::register_metrics();

        let clock = Arc::new(ManualClock::new());
        let state = AppState::with_components(config, storage, metadata, verifier, clock.clone())
            .expect("Failed to build app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            clock,
            image_root,
            _temp_dir: temp_dir,
        }
    }
}
