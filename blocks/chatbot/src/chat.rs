use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::rules::respond;
use crate::types::ChatPayload;

/// HTTP Handler: POST /chat
pub async fn chat_handler(body: &[u8]) -> Result<Response<Body>, Error> {
    let message = serde_json::from_slice::<ChatPayload>(body)
        .map(|p| p.message.trim().to_string())
        .unwrap_or_default();

    if message.is_empty() {
        return Ok(Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::json!({"error": "메시지를 입력해주세요."}).to_string().into())
            .map_err(Box::new)?);
    }

    tracing::info!("💬 Chat query: {}", message);
    let reply = respond(&message);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&reply)?.into())
        .map_err(Box::new)?)
}
