use std::collections::HashMap;

use aws_sdk_dynamodb::types::{AttributeValue, Update};
use aws_sdk_dynamodb::Client as DynamoClient;

use super::model::{display_name_for, User};

fn user_key(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

fn item_to_user(user_id: &str, item: &HashMap<String, AttributeValue>) -> User {
    let user_email = item
        .get("user_email")
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .unwrap_or_default();
    let mut user_name = item
        .get("user_name")
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .unwrap_or_default();
    if user_name.trim().is_empty() {
        user_name = display_name_for(&user_email);
    }

    User {
        user_id: user_id.to_string(),
        user_name,
        user_email,
        user_points: item
            .get("user_points")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0),
        user_created_at: item
            .get("user_created_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        user_last_login: item
            .get("user_last_login")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
    }
}

/// Get a user document, `None` if it was never created
pub async fn get_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<User>, String> {
    let pk = user_key(user_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .consistent_read(true)
        .send()
        .await
        .map_err(|e| format!("DynamoDB get_item error: {}", e))?;

    Ok(result.item().map(|item| item_to_user(user_id, item)))
}

/// Create the user document with 0 points unless it already exists.
/// Called on every sign-in; an existing balance is never touched.
pub async fn ensure_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    user_email: &str,
) -> Result<User, String> {
    let pk = user_key(user_id);
    let user = User::new(user_id, user_email);

    let put = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk.clone()))
        .item("user_name", AttributeValue::S(user.user_name.clone()))
        .item("user_email", AttributeValue::S(user.user_email.clone()))
        .item("user_points", AttributeValue::N("0".to_string()))
        .item("user_created_at", AttributeValue::S(user.user_created_at.clone()))
        .condition_expression("attribute_not_exists(PK)")
        .send()
        .await;

    match put {
        Ok(_) => {
            tracing::info!("👤 Created user document for {}", user_id);
            Ok(user)
        }
        Err(e) => {
            let exists = e
                .as_service_error()
                .map(|se| se.is_conditional_check_failed_exception())
                .unwrap_or(false);
            if !exists {
                return Err(format!("DynamoDB put_item error: {}", e));
            }

            // Existing user: stamp the login and return the stored balance
            let now = chrono::Utc::now().to_rfc3339();
            let stamped = client
                .update_item()
                .table_name(table_name)
                .key("PK", AttributeValue::S(pk.clone()))
                .key("SK", AttributeValue::S(pk))
                .update_expression("SET user_last_login = :login")
                .expression_attribute_values(":login", AttributeValue::S(now))
                .send()
                .await;
            if let Err(e) = stamped {
                tracing::warn!("⚠️ Could not stamp last login for {}: {}", user_id, e);
            }

            get_user(client, table_name, user_id)
                .await?
                .ok_or_else(|| "User not found".to_string())
        }
    }
}

/// Balance increment for use inside a write transaction.
/// Its condition fails when the user document does not exist.
pub fn credit_update(table_name: &str, user_id: &str, amount: u32) -> Result<Update, String> {
    let pk = user_key(user_id);

    Update::builder()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .update_expression("ADD user_points :amount")
        .condition_expression("attribute_exists(PK)")
        .expression_attribute_values(":amount", AttributeValue::N(amount.to_string()))
        .build()
        .map_err(|e| format!("Failed to build user points update: {}", e))
}
