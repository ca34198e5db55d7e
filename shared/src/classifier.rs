use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use recycleme_atoms::detections::{BoundingBox, Detection, WasteCategory};

use crate::capture::ImageUpload;
use crate::config::DetectorConfig;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("detection backend returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("detection request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Turns one image into labeled detections
#[async_trait]
pub trait ClassifierService: Send + Sync {
    async fn classify(&self, upload: &ImageUpload) -> Result<Vec<Detection>, ClassifierError>;
}

/// Client for the external object-detection server.
///
/// One multipart POST per image, no retry.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(config: &DetectorConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url, config.path),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClassifierService for HttpClassifier {
    async fn classify(&self, upload: &ImageUpload) -> Result<Vec<Detection>, ClassifierError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(format!("scan.{}", upload.extension()))
            .mime_str(upload.mime_type())?;
        let form = Form::new().part("file", part);

        tracing::info!("🔍 Sending {} byte image to {}", upload.bytes.len(), self.endpoint);

        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("❌ Detection backend returned {}: {}", status, body);
            return Err(ClassifierError::Http { status, body });
        }

        let body = resp.text().await?;
        let detections = parse_detections(&body);
        tracing::info!("✅ Detection backend found {} object(s)", detections.len());
        Ok(detections)
    }
}

/// Read `detections` then `other_detections` from a response body.
///
/// Anything unreadable counts as "nothing detected".
pub fn parse_detections(body: &str) -> Vec<Detection> {
    if body.trim().is_empty() {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("⚠️ Detection response is not JSON, treating as empty: {}", e);
            return Vec::new();
        }
    };

    let lists: Vec<&Value> = match &value {
        Value::Array(_) => vec![&value],
        Value::Object(map) => ["detections", "other_detections"]
            .iter()
            .filter_map(|key| map.get(*key))
            .collect(),
        _ => Vec::new(),
    };

    lists
        .into_iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter(|item| item.is_object())
        .filter_map(|item| serde_json::from_value::<Detection>(item.clone()).ok())
        .collect()
}

// Labels the offline generator draws from
const MOCK_LABELS: [&str; 9] = [
    "plastic",
    "paper",
    "can",
    "vinyl",
    "glass",
    "styrofoam",
    "battery",
    "bulky_waste",
    "other",
];

/// Offline stand-in for the detection server: 1 to 5 random detections
pub struct MockClassifier {
    rng: Mutex<StdRng>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn generate(&self) -> Vec<Detection> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let count = rng.gen_range(1..=5);
        (0..count)
            .map(|_| {
                let label = MOCK_LABELS[rng.gen_range(0..MOCK_LABELS.len())];
                let bounding_box = BoundingBox {
                    x1: rng.gen_range(0.0..100.0),
                    y1: rng.gen_range(0.0..100.0),
                    x2: rng.gen_range(100.0..300.0),
                    y2: rng.gen_range(100.0..300.0),
                };
                Detection::new(
                    WasteCategory::parse(label),
                    rng.gen_range(0.7..=1.0),
                    bounding_box,
                )
            })
            .collect()
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierService for MockClassifier {
    async fn classify(&self, upload: &ImageUpload) -> Result<Vec<Detection>, ClassifierError> {
        let detections = self.generate();
        tracing::info!(
            "🎲 Mock classifier produced {} detection(s) for a {}x{} image",
            detections.len(),
            upload.width,
            upload.height
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::png_bytes;
    use wiremock::matchers::{header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upload() -> ImageUpload {
        ImageUpload::from_bytes(png_bytes(4, 4), Some("image/png")).unwrap()
    }

    fn classifier(server: &MockServer, path: &str) -> HttpClassifier {
        HttpClassifier::new(&DetectorConfig {
            base_url: server.uri(),
            path: path.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn merges_primary_and_battery_model_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [
                    {"class": "plastic", "confidence": 0.91, "box": [[10, 20, 110, 220]]},
                    {"class": "paper", "confidence": 0.8, "box": [0, 0, 5, 5]}
                ],
                "other_detections": [
                    {"class": "battery", "confidence": 0.77, "box": [[1, 2, 3, 4]]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let detections = classifier(&server, "/detect").classify(&upload()).await.unwrap();
        let labels: Vec<&str> = detections.iter().map(|d| d.category.as_str()).collect();
        assert_eq!(labels, vec!["plastic", "paper", "battery"]);
        assert_eq!(detections[0].bounding_box.x2, 110.0);
    }

    #[tokio::test]
    async fn empty_or_missing_detections_are_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/recycle/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/detect"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(classifier(&server, "/recycle/").classify(&upload()).await.unwrap().is_empty());
        assert!(classifier(&server, "/api/detect").classify(&upload()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_is_reported_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(1)
            .mount(&server)
            .await;

        let err = classifier(&server, "/detect").classify(&upload()).await.unwrap_err();
        match err {
            ClassifierError::Http { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "model crashed");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn parse_skips_garbage_entries() {
        assert!(parse_detections("not json").is_empty());
        assert!(parse_detections(r#"{"detections": "nope"}"#).is_empty());

        let detections = parse_detections(r#"{"detections": [42, {"class": "glass", "confidence": 0.5}]}"#);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].category, WasteCategory::Glass);
    }

    #[tokio::test]
    async fn mock_output_stays_in_range() {
        let mock = MockClassifier::seeded(7);
        for _ in 0..20 {
            let detections = mock.classify(&upload()).await.unwrap();
            assert!((1..=5).contains(&detections.len()));
            for d in &detections {
                assert!((0.7..=1.0).contains(&d.confidence));
                assert!(d.bounding_box.x2 >= 100.0);
            }
        }
    }

    #[tokio::test]
    async fn seeded_mocks_repeat() {
        let a = MockClassifier::seeded(42).classify(&upload()).await.unwrap();
        let b = MockClassifier::seeded(42).classify(&upload()).await.unwrap();
        assert_eq!(a, b);
    }
}
