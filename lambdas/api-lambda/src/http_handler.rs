use std::sync::Arc;

use chatbot_block::chat;
use lambda_http::http::header::{HeaderValue, VARY};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use recycleme_atoms::points;
use recycleme_shared::{
    auth,
    http::{cors_origin, method_not_allowed, not_found},
    scan_flow, users, AppState,
};

fn with_cors_headers(mut resp: Response<Body>, allowed: &[String], request_origin: Option<&str>) -> Response<Body> {
    let origin = cors_origin(allowed, request_origin);

    let headers = resp.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_str(&origin).unwrap_or_else(|_| HeaderValue::from_static("*")),
    );
    if origin != "*" {
        headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
    }
    headers.insert("Access-Control-Allow-Methods", HeaderValue::from_static("GET,POST,OPTIONS"));
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization,Cookie"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));

    resp
}

fn finalize_response(
    resp: Result<Response<Body>, Error>,
    allowed: &[String],
    request_origin: Option<&str>,
) -> Result<Response<Body>, Error> {
    resp.map(|r| with_cors_headers(r, allowed, request_origin))
}

fn header<'a>(event: &'a Request, name: &str) -> Option<&'a str> {
    event.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Main Lambda handler - public routes first, then the signed-in ones
pub(crate) async fn function_handler(event: Request, state: Arc<AppState>) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body: &[u8] = event.body();
    let request_origin = header(&event, "Origin");
    let authorization = header(&event, "Authorization");
    let cookie_header = header(&event, "Cookie");
    let content_type = header(&event, "Content-Type");
    let cors = state.config.cors_origins.as_slice();

    tracing::info!("🚀 RecycleMe API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if *method == Method::OPTIONS {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?;
        return Ok(with_cors_headers(resp, cors, request_origin));
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // --- PUBLIC ---
    let public = match (method, parts.as_slice()) {
        // POST /signup - create account (0 points)
        (&Method::POST, ["signup"]) => {
            Some(auth::signup(state.auth.as_ref(), state.points.as_ref(), body).await)
        }
        // POST /login
        (&Method::POST, ["login"]) => {
            Some(auth::login(state.auth.as_ref(), state.points.as_ref(), body).await)
        }
        // POST /chat - keyword chatbot
        (&Method::POST, ["chat"]) => Some(chat::chat_handler(body).await),
        // POST /detect - anyone may scan; signed-in scans become claimable
        (&Method::POST, ["detect"]) => {
            let identity = auth::optional_identity(state.auth.as_ref(), authorization, cookie_header).await;
            Some(scan_flow::detect_handler(&state, identity.as_ref(), content_type, body).await)
        }
        // POST /points/claim - signed-out callers get 401 from the flow
        (&Method::POST, ["points", "claim"]) => {
            let identity = auth::optional_identity(state.auth.as_ref(), authorization, cookie_header).await;
            Some(scan_flow::claim_handler(&state, identity.as_ref(), body).await)
        }
        (_, ["signup"] | ["login"] | ["chat"] | ["detect"] | ["points", "claim"]) => Some(method_not_allowed()),
        _ => None,
    };
    if let Some(resp) = public {
        return finalize_response(resp, cors, request_origin);
    }

    let known = matches!(
        parts.as_slice(),
        ["logout"] | ["users", "me"] | ["points"] | ["points", "history"] | ["points", "stats"]
    );
    if !known {
        tracing::warn!("⚠️ No route matched - Method: {} Path: {}", method, path);
        return finalize_response(not_found(), cors, request_origin);
    }

    // --- SIGNED IN ---
    let identity = match auth::authenticate(state.auth.as_ref(), authorization, cookie_header).await {
        Ok(identity) => identity,
        Err(resp) => return Ok(with_cors_headers(resp, cors, request_origin)),
    };

    let resp = match (method, parts.as_slice()) {
        // POST /logout
        (&Method::POST, ["logout"]) => {
            let token = auth::extract_token(authorization, cookie_header).unwrap_or_default();
            auth::logout(state.auth.as_ref(), &token).await
        }
        // GET /users/me
        (&Method::GET, ["users", "me"]) => users::get_me_handler(state.points.as_ref(), &identity).await,
        // GET /points - balance + recent history
        (&Method::GET, ["points"]) => {
            points::get_points_handler(state.points.as_ref(), &identity.user_id).await
        }
        // GET /points/history?limit=N
        (&Method::GET, ["points", "history"]) => {
            let limit = event
                .query_string_parameters_ref()
                .and_then(|params| params.first("limit"));
            points::get_history_handler(state.points.as_ref(), &identity.user_id, limit).await
        }
        // GET /points/stats
        (&Method::GET, ["points", "stats"]) => {
            points::get_stats_handler(state.points.as_ref(), &identity.user_id).await
        }
        _ => method_not_allowed(),
    };

    finalize_response(resp, cors, request_origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recycleme_atoms::storage::LocalStore;
    use recycleme_shared::classifier::MockClassifier;
    use recycleme_shared::config::AppConfig;

    // 2x2 RGB PNG
    const TINY_PNG: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAIAAAACCAIAAAD91JpzAAAAC0lEQVR4nGNgQAYAAA4AAamRc7EAAAAASUVORK5CYII=";

    fn state() -> Arc<AppState> {
        Arc::new(AppState::local(
            AppConfig::from_lookup(|_| None).unwrap(),
            Arc::new(LocalStore::in_memory()),
            Arc::new(MockClassifier::seeded(3)),
        ))
    }

    fn request(method: Method, path: &str, token: Option<&str>, body: &str) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .method(method)
            .uri(path)
            .header("Origin", "http://localhost:3000")
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn body_json(resp: &Response<Body>) -> serde_json::Value {
        match resp.body() {
            Body::Text(t) => serde_json::from_str(t).unwrap(),
            Body::Binary(b) => serde_json::from_slice(b).unwrap(),
            Body::Empty => serde_json::Value::Null,
        }
    }

    async fn sign_up(state: &Arc<AppState>, email: &str) -> String {
        let body = serde_json::json!({"email": email, "password": "pw"}).to_string();
        let resp = function_handler(request(Method::POST, "/signup", None, &body), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(&resp)["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn preflight_echoes_allowed_origin() {
        let resp = function_handler(request(Method::OPTIONS, "/detect", None, ""), state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn unknown_routes_and_methods() {
        let state = state();
        let resp = function_handler(request(Method::GET, "/nope", None, ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = function_handler(request(Method::GET, "/detect", None, ""), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn signed_in_routes_need_a_token() {
        let resp = function_handler(request(Method::GET, "/users/me", None, ""), state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get("Access-Control-Allow-Origin").is_some());
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let state = state();
        let token = sign_up(&state, "kim@example.com").await;

        let resp = function_handler(request(Method::GET, "/users/me", Some(&token), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(&resp)["user_email"], "kim@example.com");

        let resp = function_handler(request(Method::GET, "/points", Some(&token), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(body_json(&resp)["total_points"], 0);

        let resp = function_handler(request(Method::POST, "/logout", Some(&token), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = function_handler(request(Method::GET, "/users/me", Some(&token), ""), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn scan_and_claim() {
        let state = state();
        let token = sign_up(&state, "lee@example.com").await;

        let body = serde_json::json!({ "image_data": TINY_PNG }).to_string();
        let resp = function_handler(request(Method::POST, "/detect", Some(&token), &body), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let scan = body_json(&resp);
        assert_eq!(scan["signed_in"], true);
        let scan_id = scan["scan"]["scan_id"].as_str().unwrap().to_string();
        let claimable = scan["claimable_points"].as_u64().unwrap();

        let claim = serde_json::json!({ "scan_id": scan_id }).to_string();
        let resp = function_handler(request(Method::POST, "/points/claim", Some(&token), &claim), state.clone())
            .await
            .unwrap();
        if claimable > 0 {
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_json(&resp)["receipt"]["balance"], claimable);
        } else {
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }

        let resp = function_handler(request(Method::GET, "/points", Some(&token), ""), state)
            .await
            .unwrap();
        assert_eq!(body_json(&resp)["total_points"], claimable);
    }

    #[tokio::test]
    async fn points_history_and_stats() {
        let state = state();
        let token = sign_up(&state, "choi@example.com").await;
        let id = recycleme_shared::auth::LocalAuth::user_id_for("choi@example.com");
        for amount in [12, 8] {
            state.points.award(&id, amount, "scan").await.unwrap();
        }

        let event = request(Method::GET, "/points/history", Some(&token), "").with_query_string_parameters(
            std::collections::HashMap::from([("limit".to_string(), "1".to_string())]),
        );
        let resp = function_handler(event, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let history = body_json(&resp);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["amount"], 8);

        let resp = function_handler(request(Method::GET, "/points/stats", Some(&token), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(body_json(&resp)["total_earned"], 20);

        let resp = function_handler(request(Method::GET, "/points/stats", None, ""), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_scan_cannot_be_claimed() {
        let state = state();
        let body = serde_json::json!({ "image_data": TINY_PNG }).to_string();
        let resp = function_handler(request(Method::POST, "/detect", None, &body), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let scan_id = body_json(&resp)["scan"]["scan_id"].as_str().unwrap().to_string();

        let claim = serde_json::json!({ "scan_id": scan_id }).to_string();
        let resp = function_handler(request(Method::POST, "/points/claim", None, &claim), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn raw_image_body_is_accepted() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let bytes = STANDARD.decode(TINY_PNG).unwrap();
        let event = lambda_http::http::Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header("Content-Type", "image/png")
            .body(Body::from(bytes))
            .unwrap();
        let resp = function_handler(event, state()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_route() {
        let body = serde_json::json!({"message": "관악구 장롱 수수료"}).to_string();
        let resp = function_handler(request(Method::POST, "/chat", None, &body), state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(&resp)["type"], "waste_fees");

        let resp = function_handler(request(Method::POST, "/chat", None, "{}"), state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mock_mode_state_persists_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let path_str = path.to_string_lossy().to_string();
        let config = AppConfig::from_lookup(|key| match key {
            "BACKEND_MODE" => Some("mock".to_string()),
            "LOCAL_STORE_PATH" => Some(path_str.clone()),
            _ => None,
        })
        .unwrap();

        let state = Arc::new(AppState::from_config(config.clone()).await.unwrap());
        sign_up(&state, "park@example.com").await;
        drop(state);

        let reopened = AppState::from_config(config).await.unwrap();
        let id = recycleme_shared::auth::LocalAuth::user_id_for("park@example.com");
        assert!(reopened.points.get_user(&id).await.unwrap().is_some());
    }
}
