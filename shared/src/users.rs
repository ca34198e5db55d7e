use lambda_http::{http::StatusCode, Body, Error, Response};

use recycleme_atoms::points::{points_error_response, PointsService};

use crate::auth::Identity;
use crate::http::json_response;

/// HTTP Handler: GET /users/me
///
/// Accounts are created lazily, so a verified identity always has a user record.
pub async fn get_me_handler(points: &dyn PointsService, identity: &Identity) -> Result<Response<Body>, Error> {
    let existing = match points.get_user(&identity.user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("❌ Failed to load user {}: {}", identity.user_id, e);
            return points_error_response(&e);
        }
    };

    let user = match existing {
        Some(user) => user,
        None => match points.ensure_account(&identity.user_id, &identity.email).await {
            Ok(user) => user,
            Err(e) => return points_error_response(&e),
        },
    };

    json_response(StatusCode::OK, &user)
}
