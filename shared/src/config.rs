use std::path::PathBuf;

use recycleme_atoms::detections::WeightTable;

/// Which collaborators back auth and points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Cognito + DynamoDB
    Remote,
    /// Local key/value store, no AWS calls
    Mock,
}

impl BackendMode {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "remote" | "aws" => Ok(BackendMode::Remote),
            "mock" | "local" => Ok(BackendMode::Mock),
            other => Err(format!("BACKEND_MODE must be 'remote' or 'mock', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CognitoConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Needed to auto-confirm new sign-ups
    pub user_pool_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub base_url: String,
    pub path: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: BackendMode,
    pub table_name: String,
    pub cognito: Option<CognitoConfig>,
    /// `None` means the mock classifier is used
    pub detector: Option<DetectorConfig>,
    pub weights: WeightTable,
    pub local_store_path: Option<PathBuf>,
    pub scan_bucket: Option<String>,
    pub cors_origins: Vec<String>,
}

const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8000"];

impl AppConfig {
    /// Load config from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary lookup.
    ///
    /// Remote mode fails fast when Cognito credentials are missing;
    /// blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get("BACKEND_MODE") {
            Some(raw) => BackendMode::parse(&raw)?,
            None => BackendMode::Mock,
        };

        let cognito = match (get("COGNITO_CLIENT_ID"), get("COGNITO_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(CognitoConfig {
                client_id,
                client_secret,
                user_pool_id: get("COGNITO_USER_POOL_ID"),
            }),
            _ => None,
        };
        if mode == BackendMode::Remote && cognito.is_none() {
            return Err(
                "COGNITO_CLIENT_ID and COGNITO_CLIENT_SECRET must be set when BACKEND_MODE=remote"
                    .to_string(),
            );
        }

        let detector = match get("DETECT_API_URL") {
            Some(base_url) => {
                let timeout_secs = match get("DETECT_TIMEOUT_SECS") {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| format!("DETECT_TIMEOUT_SECS must be a number, got '{}'", raw))?,
                    None => 30,
                };
                let mut path = get("DETECT_PATH").unwrap_or_else(|| "/detect".to_string());
                if !path.starts_with('/') {
                    path.insert(0, '/');
                }
                Some(DetectorConfig {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    path,
                    timeout_secs,
                })
            }
            None => None,
        };

        let weights = match get("POINT_WEIGHTS") {
            Some(raw) => WeightTable::from_overrides(&raw).map_err(|e| format!("POINT_WEIGHTS: {}", e))?,
            None => WeightTable::default(),
        };

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            mode,
            table_name: get("TABLE_NAME").unwrap_or_else(|| "recycleme".to_string()),
            cognito,
            detector,
            weights,
            local_store_path: get("LOCAL_STORE_PATH").map(PathBuf::from),
            scan_bucket: get("SCAN_BUCKET"),
            cors_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recycleme_atoms::detections::WasteCategory;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_to_mock_everything() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.mode, BackendMode::Mock);
        assert!(cfg.detector.is_none());
        assert_eq!(cfg.table_name, "recycleme");
        assert_eq!(cfg.cors_origins.len(), 2);
    }

    #[test]
    fn remote_requires_cognito() {
        let err = config(&[("BACKEND_MODE", "remote")]).unwrap_err();
        assert!(err.contains("COGNITO_CLIENT_ID"));

        let cfg = config(&[
            ("BACKEND_MODE", "remote"),
            ("COGNITO_CLIENT_ID", "id"),
            ("COGNITO_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert_eq!(cfg.mode, BackendMode::Remote);
        assert!(cfg.cognito.unwrap().user_pool_id.is_none());
    }

    #[test]
    fn detector_settings() {
        let cfg = config(&[
            ("DETECT_API_URL", "http://models:8000/"),
            ("DETECT_PATH", "api/detect"),
            ("DETECT_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        let detector = cfg.detector.unwrap();
        assert_eq!(detector.base_url, "http://models:8000");
        assert_eq!(detector.path, "/api/detect");
        assert_eq!(detector.timeout_secs, 5);

        assert!(config(&[("DETECT_API_URL", "http://x"), ("DETECT_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn weights_and_bad_mode() {
        let cfg = config(&[("POINT_WEIGHTS", "paper=7")]).unwrap();
        assert_eq!(cfg.weights.weight(&WasteCategory::Paper), 7);

        assert!(config(&[("BACKEND_MODE", "firebase")]).is_err());
    }
}
