use std::sync::Arc;

use skyguard_db::catalog::VideoCatalog;
use skyguard_pipeline::controller::{JobController, PipelineConfig};
use skyguard_pipeline::inference::{Classifier, Detector};
use skyguard_pipeline::registry::JobRegistry;
use skyguard_store::ResultStore;

use crate::config::ServerConfig;
use crate::handlers::alerts::AlertBoard;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Durable video catalog (Postgres or in-memory).
    pub catalog: Arc<dyn VideoCatalog>,
    /// Hot per-frame result store.
    pub results: Arc<ResultStore>,
    /// Supervised registry of running job tasks.
    pub registry: Arc<JobRegistry>,
    /// Job controller driving uploads through the pipeline.
    pub controller: Arc<JobController>,
    /// Injected detection capability (shared across jobs).
    pub detector: Arc<dyn Detector>,
    /// Injected classification capability (shared across jobs).
    pub classifier: Arc<dyn Classifier>,
    /// WebSocket connection manager.
    pub ws_manager: Arc<WsManager>,
    /// In-memory alert board (mock data surface).
    pub alerts: Arc<AlertBoard>,
}

impl AppState {
    /// Assemble the application state from its capabilities.
    ///
    /// The controller is constructed here so every job shares the same
    /// injected detector/classifier instances.
    pub fn new(
        config: ServerConfig,
        catalog: Arc<dyn VideoCatalog>,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let results = Arc::new(ResultStore::new());
        let pipeline_config = PipelineConfig {
            detection_model: config.detection_model.clone(),
            classification_model: config.classification_model.clone(),
            ..PipelineConfig::default()
        };
        let controller = Arc::new(JobController::new(
            Arc::clone(&results),
            Arc::clone(&catalog),
            Arc::clone(&detector),
            Arc::clone(&classifier),
            pipeline_config,
        ));

        Self {
            config: Arc::new(config),
            catalog,
            results,
            registry: Arc::new(JobRegistry::new()),
            controller,
            detector,
            classifier,
            ws_manager: Arc::new(WsManager::new()),
            alerts: Arc::new(AlertBoard::with_seed_data()),
        }
    }
}
