pub mod archive;
pub mod auth;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod http;
pub mod scan_flow;
pub mod session;
pub mod tracing_init;
pub mod users;

use std::sync::Arc;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;

use recycleme_atoms::detections::WeightTable;
use recycleme_atoms::points::{DynamoPointsService, LocalPointsService, PointsService};
use recycleme_atoms::storage::LocalStore;

use archive::ScanArchive;
use auth::{AuthProvider, CognitoAuth, LocalAuth};
use classifier::{ClassifierService, HttpClassifier, MockClassifier};
use config::{AppConfig, BackendMode};

/// Everything a request handler needs, built once per cold start
pub struct AppState {
    pub config: AppConfig,
    pub auth: Arc<dyn AuthProvider>,
    pub points: Arc<dyn PointsService>,
    pub classifier: Arc<dyn ClassifierService>,
    pub archive: Option<ScanArchive>,
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> Result<Self, String> {
        let classifier: Arc<dyn ClassifierService> = match &config.detector {
            Some(detector) => {
                let client = HttpClassifier::new(detector)
                    .map_err(|e| format!("Failed to build detection client: {}", e))?;
                tracing::info!("🔌 Using detection backend at {}", client.endpoint());
                Arc::new(client)
            }
            None => {
                tracing::warn!("⚠️ DETECT_API_URL not set, using the mock classifier");
                Arc::new(MockClassifier::new())
            }
        };

        match config.mode {
            BackendMode::Remote => {
                let cognito = config
                    .cognito
                    .clone()
                    .ok_or_else(|| "Cognito settings are required in remote mode".to_string())?;

                let aws_config = aws_config::load_from_env().await;
                let archive = config
                    .scan_bucket
                    .as_ref()
                    .map(|bucket| ScanArchive::new(S3Client::new(&aws_config), bucket.clone()));

                tracing::info!("☁️ Remote backend: table {}", config.table_name);
                Ok(Self {
                    auth: Arc::new(CognitoAuth::new(CognitoClient::new(&aws_config), cognito)),
                    points: Arc::new(DynamoPointsService::new(
                        DynamoClient::new(&aws_config),
                        config.table_name.clone(),
                    )),
                    classifier,
                    archive,
                    config,
                })
            }
            BackendMode::Mock => {
                let store = match &config.local_store_path {
                    Some(path) => LocalStore::open(path)?,
                    None => LocalStore::in_memory(),
                };
                if config.scan_bucket.is_some() {
                    tracing::warn!("⚠️ SCAN_BUCKET is ignored in mock mode");
                }
                tracing::info!("🧪 Mock backend: auth and points kept locally");
                Ok(Self::local(config, Arc::new(store), classifier))
            }
        }
    }

    /// Mock-mode state over a local store
    pub fn local(config: AppConfig, store: Arc<LocalStore>, classifier: Arc<dyn ClassifierService>) -> Self {
        Self {
            config,
            auth: Arc::new(LocalAuth::new(store.clone())),
            points: Arc::new(LocalPointsService::new(store)),
            classifier,
            archive: None,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.config.weights
    }
}
