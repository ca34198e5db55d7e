use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};

use super::error::PointsError;
use super::model::{PointsBalance, PointsStats};
use super::service::PointsService;

/// Transactions shown with the balance, and the default history page
pub const RECENT_TRANSACTION_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;
/// Upper bound on transactions folded into the stats
pub const STATS_TRANSACTION_LIMIT: usize = 1000;

/// `limit` query value for the history route: default 10, 1..=100
pub fn parse_history_limit(raw: Option<&str>) -> Result<usize, String> {
    let Some(raw) = raw else {
        return Ok(RECENT_TRANSACTION_LIMIT);
    };
    match raw.trim().parse::<usize>() {
        Ok(limit) if (1..=MAX_HISTORY_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT)),
    }
}

fn bad_request(message: &str) -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({ "error": message }).to_string().into())
        .map_err(Box::new)?)
}

async fn load_balance(points: &dyn PointsService, user_id: &str) -> Result<u64, PointsError> {
    points
        .get_user(user_id)
        .await?
        .map(|u| u.user_points)
        .ok_or(PointsError::UserNotFound)
}

impl PointsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PointsError::UserNotFound | PointsError::ScanNotFound => StatusCode::NOT_FOUND,
            PointsError::AlreadyClaimed => StatusCode::CONFLICT,
            PointsError::BatteryRedirect | PointsError::NothingToClaim => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PointsError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body for a points failure. Storage details stay in the logs.
pub fn points_error_response(e: &PointsError) -> Result<Response<Body>, LambdaError> {
    let message = match e {
        PointsError::Storage(_) => "Failed to update points. Please try again later.".to_string(),
        other => other.to_string(),
    };

    Ok(Response::builder()
        .status(e.status_code())
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({ "error": message }).to_string().into())
        .map_err(Box::new)?)
}

/// HTTP Handler: GET /points
pub async fn get_points_handler(
    points: &dyn PointsService,
    user_id: &str,
) -> Result<Response<Body>, LambdaError> {
    let user = match points.get_user(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return points_error_response(&PointsError::UserNotFound),
        Err(e) => {
            tracing::error!("❌ get_points_handler failed to load user {}: {}", user_id, e);
            return points_error_response(&e);
        }
    };

    let recent_transactions = match points.history(user_id, RECENT_TRANSACTION_LIMIT).await {
        Ok(txns) => txns,
        Err(e) => {
            tracing::error!("❌ get_points_handler failed to load history for {}: {}", user_id, e);
            return points_error_response(&e);
        }
    };

    let balance = PointsBalance {
        user_id: user.user_id,
        total_points: user.user_points,
        recent_transactions,
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&balance)?.into())
        .map_err(Box::new)?)
}

/// HTTP Handler: GET /points/history?limit=N
pub async fn get_history_handler(
    points: &dyn PointsService,
    user_id: &str,
    limit: Option<&str>,
) -> Result<Response<Body>, LambdaError> {
    let limit = match parse_history_limit(limit) {
        Ok(limit) => limit,
        Err(message) => return bad_request(&message),
    };

    if let Err(e) = load_balance(points, user_id).await {
        return points_error_response(&e);
    }

    let transactions = match points.history(user_id, limit).await {
        Ok(txns) => txns,
        Err(e) => {
            tracing::error!("❌ get_history_handler failed for {}: {}", user_id, e);
            return points_error_response(&e);
        }
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&transactions)?.into())
        .map_err(Box::new)?)
}

/// HTTP Handler: GET /points/stats
pub async fn get_stats_handler(
    points: &dyn PointsService,
    user_id: &str,
) -> Result<Response<Body>, LambdaError> {
    let total_points = match load_balance(points, user_id).await {
        Ok(balance) => balance,
        Err(e) => return points_error_response(&e),
    };

    let stats = match points.history(user_id, STATS_TRANSACTION_LIMIT).await {
        Ok(txns) => PointsStats::from_history(total_points, &txns),
        Err(e) => {
            tracing::error!("❌ get_stats_handler failed for {}: {}", user_id, e);
            return points_error_response(&e);
        }
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&stats)?.into())
        .map_err(Box::new)?)
}
