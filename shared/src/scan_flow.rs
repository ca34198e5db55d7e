use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Deserialize;

use recycleme_atoms::detections::{ScanResult, WeightTable};
use recycleme_atoms::points::{points_error_response, ClaimPayload, ClaimReceipt, PointsError, PointsService};

use crate::auth::Identity;
use crate::capture::{CameraDevice, CameraError, CameraSession, CaptureError, ImageUpload, UploadError};
use crate::classifier::{ClassifierError, ClassifierService};
use crate::http::{error_response, json_response};
use crate::session::{SessionStore, SessionUser};
use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("이미지 분류 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.")]
    Classification(#[source] ClassifierError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("적립금을 받으려면 로그인이 필요합니다.")]
    NotSignedIn,
    #[error(transparent)]
    Points(#[from] PointsError),
}

impl From<CaptureError> for FlowError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Camera(e) => FlowError::Camera(e),
            CaptureError::Upload(e) => FlowError::Upload(e),
        }
    }
}

impl FlowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FlowError::Classification(_) => StatusCode::BAD_GATEWAY,
            FlowError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            FlowError::Upload(UploadError::UnsupportedType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            FlowError::Upload(_) | FlowError::Camera(_) => StatusCode::BAD_REQUEST,
            FlowError::NotSignedIn => StatusCode::UNAUTHORIZED,
            FlowError::Points(e) => e.status_code(),
        }
    }
}

/// Capture/upload -> classify -> score -> claim, for one session
pub struct ScanFlow<'a> {
    classifier: &'a dyn ClassifierService,
    points: &'a dyn PointsService,
    weights: &'a WeightTable,
    session: &'a SessionStore,
}

impl<'a> ScanFlow<'a> {
    pub fn new(
        classifier: &'a dyn ClassifierService,
        points: &'a dyn PointsService,
        weights: &'a WeightTable,
        session: &'a SessionStore,
    ) -> Self {
        Self {
            classifier,
            points,
            weights,
            session,
        }
    }

    /// Classify one image. A signed-in scan is recorded so it can be claimed later;
    /// if that record cannot be written the scan fails as a whole.
    pub async fn scan_upload(&self, upload: &ImageUpload) -> Result<ScanResult, FlowError> {
        let detections = self.classifier.classify(upload).await.map_err(|e| {
            tracing::error!("❌ Classification failed: {}", e);
            FlowError::Classification(e)
        })?;

        let result = ScanResult::from_detections(self.weights, detections);
        tracing::info!(
            "🧾 Scan {}: {} detection(s), {} point(s), battery={}",
            result.scan_id,
            result.detections.len(),
            result.total_points,
            result.has_battery
        );

        if let Some(user) = self.session.current() {
            self.points
                .record_scan(&user.user_id, &result)
                .await
                .map_err(|e| {
                    tracing::error!("❌ Could not record scan {} for {}: {}", result.scan_id, user.user_id, e);
                    FlowError::Points(e)
                })?;
        }

        Ok(result)
    }

    /// Take a still from the camera, release it, then classify the frame
    pub async fn scan_camera(&self, device: &mut dyn CameraDevice) -> Result<ScanResult, FlowError> {
        let upload = CameraSession::open(device)?.capture()?;
        self.scan_upload(&upload).await
    }

    /// Award a scan's points. Signed-out callers change nothing.
    pub async fn claim(&self, scan_id: &str) -> Result<ClaimReceipt, FlowError> {
        let user = self.session.current().ok_or(FlowError::NotSignedIn)?;

        let receipt = self.points.claim_scan(&user.user_id, scan_id).await?;
        self.session.award_local(receipt.awarded);
        self.session.sync_balance(receipt.balance);
        Ok(receipt)
    }
}

fn flow_error_response(e: &FlowError) -> Result<Response<Body>, Error> {
    match e {
        FlowError::Points(pe) => points_error_response(pe),
        other => error_response(other.status_code(), &other.to_string()),
    }
}

/// Session for one request, seeded from the caller's account
async fn request_session(points: &dyn PointsService, identity: Option<&Identity>) -> Result<SessionStore, PointsError> {
    let Some(identity) = identity else {
        return Ok(SessionStore::new());
    };
    let user = points.ensure_account(&identity.user_id, &identity.email).await?;
    Ok(SessionStore::signed_in(SessionUser::from(&user)))
}

#[derive(Deserialize)]
struct DetectRequest {
    #[serde(default)]
    image_data: String,
}

/// JSON `{"image_data": "<base64>"}` or the raw image as the body
pub fn parse_upload(content_type: Option<&str>, body: &[u8]) -> Result<ImageUpload, UploadError> {
    let is_json = content_type
        .map(|c| c.trim().to_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        let req: DetectRequest = serde_json::from_slice(body).map_err(|_| UploadError::InvalidBase64)?;
        ImageUpload::from_base64(&req.image_data)
    } else {
        ImageUpload::from_bytes(body.to_vec(), content_type)
    }
}

/// HTTP Handler: POST /detect
pub async fn detect_handler(
    state: &AppState,
    identity: Option<&Identity>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let upload = match parse_upload(content_type, body) {
        Ok(upload) => upload,
        Err(e) => {
            tracing::warn!("⚠️ Rejected upload: {}", e);
            return flow_error_response(&FlowError::Upload(e));
        }
    };

    let session = match request_session(state.points.as_ref(), identity).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("❌ Failed to load account for scan: {}", e);
            return points_error_response(&e);
        }
    };

    let flow = ScanFlow::new(
        state.classifier.as_ref(),
        state.points.as_ref(),
        state.weights(),
        &session,
    );
    let result = match flow.scan_upload(&upload).await {
        Ok(result) => result,
        Err(e) => return flow_error_response(&e),
    };

    if let (Some(archive), Some(identity)) = (&state.archive, identity) {
        if let Err(e) = archive.store(&identity.user_id, &result.scan_id, &upload).await {
            tracing::warn!("⚠️ Scan image not archived: {}", e);
        }
    }

    let message = result.is_empty().then_some("탐지된 항목이 없습니다.");
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "scan": result,
            "outcome": result.outcome(),
            "claimable_points": result.claimable_points(),
            "special_messages": result.special_messages(),
            "message": message,
            "signed_in": session.is_signed_in(),
        }),
    )
}

/// HTTP Handler: POST /points/claim
pub async fn claim_handler(
    state: &AppState,
    identity: Option<&Identity>,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: ClaimPayload = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request: {}", e));
        }
    };

    let session = match request_session(state.points.as_ref(), identity).await {
        Ok(session) => session,
        Err(e) => return points_error_response(&e),
    };

    let flow = ScanFlow::new(
        state.classifier.as_ref(),
        state.points.as_ref(),
        state.weights(),
        &session,
    );
    match flow.claim(&payload.scan_id).await {
        Ok(receipt) => json_response(
            StatusCode::OK,
            &serde_json::json!({
                "receipt": receipt,
                "user": session.current(),
            }),
        ),
        Err(e) => {
            tracing::warn!("⚠️ Claim for scan {} refused: {}", payload.scan_id, e);
            flow_error_response(&e)
        }
    }
}
