use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

/// JSON response with the default open CORS header; the router overrides it per origin
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Pick the `Access-Control-Allow-Origin` value for a request
pub fn cors_origin(allowed: &[String], request_origin: Option<&str>) -> String {
    if let Some(origin) = request_origin {
        if allowed.iter().any(|a| a == origin) {
            return origin.to_string();
        }
    }
    if allowed.iter().any(|a| a == "*") {
        return "*".to_string();
    }
    allowed.first().cloned().unwrap_or_else(|| "*".to_string())
}
