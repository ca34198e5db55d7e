use serde::{Deserialize, Serialize};

/// A signed-in identity and its loyalty points balance
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_points: u64,
    pub user_created_at: String,
    pub user_last_login: Option<String>,
}

impl User {
    /// Fresh account with a zero balance
    pub fn new(user_id: &str, user_email: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_name: display_name_for(user_email),
            user_email: user_email.to_string(),
            user_points: 0,
            user_created_at: chrono::Utc::now().to_rfc3339(),
            user_last_login: None,
        }
    }
}

/// Local part of the email, or "User" when there isn't one
pub fn display_name_for(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("User")
        .to_string()
}
