use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::ProvideErrorMetadata;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use recycleme_atoms::points::PointsService;
use recycleme_atoms::storage::{LocalStore, AUTH_TOKEN_KEY, USERS_KEY};

use crate::config::CognitoConfig;
use crate::http::error_response;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

type HmacSha256 = Hmac<Sha256>;

/// Who a token belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub identity: Identity,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i32>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("이메일과 비밀번호를 입력해주세요.")]
    MissingCredentials,
    #[error("이메일 또는 비밀번호가 올바르지 않습니다.")]
    InvalidCredentials,
    #[error("이미 가입된 이메일입니다.")]
    UserExists,
    #[error("비밀번호가 요구 조건을 만족하지 않습니다: {0}")]
    InvalidPassword(String),
    #[error("로그인이 필요합니다.")]
    Unauthorized,
    #[error("auth provider error: {0}")]
    Provider(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidPassword(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// External identity provider seam
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
    async fn verify(&self, access_token: &str) -> Result<Identity, AuthError>;
}

/// Cognito's SECRET_HASH: base64(HMAC-SHA256(secret, username + client_id))
pub fn secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| AuthError::Provider(format!("Invalid client secret: {}", e)))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn check_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(())
}

pub struct CognitoAuth {
    client: CognitoClient,
    config: CognitoConfig,
}

impl CognitoAuth {
    pub fn new(client: CognitoClient, config: CognitoConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl AuthProvider for CognitoAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        check_credentials(email, password)?;
        let hash = secret_hash(email, &self.config.client_id, &self.config.client_secret)?;

        let email_attr = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let result = self
            .client
            .sign_up()
            .client_id(&self.config.client_id)
            .secret_hash(hash)
            .username(email)
            .password(password)
            .user_attributes(email_attr)
            .send()
            .await;

        if let Err(e) = result {
            let mapped = match e.as_service_error() {
                Some(se) if se.is_username_exists_exception() => AuthError::UserExists,
                Some(se) if se.is_invalid_password_exception() => {
                    AuthError::InvalidPassword(se.message().unwrap_or_default().to_string())
                }
                _ => AuthError::Provider(format!("Cognito sign_up error: {}", e)),
            };
            tracing::error!("❌ Sign up failed for {}: {}", email, mapped);
            return Err(mapped);
        }

        // Without a pool id the account stays unconfirmed and sign-in below fails
        if let Some(pool_id) = &self.config.user_pool_id {
            self.client
                .admin_confirm_sign_up()
                .user_pool_id(pool_id)
                .username(email)
                .send()
                .await
                .map_err(|e| AuthError::Provider(format!("Cognito admin_confirm_sign_up error: {}", e)))?;
        }

        tracing::info!("✅ Signed up {}", email);
        self.sign_in(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        check_credentials(email, password)?;
        let hash = secret_hash(email, &self.config.client_id, &self.config.client_secret)?;

        let result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.config.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", hash)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_authorized_exception() || se.is_user_not_found_exception() => {
                    AuthError::InvalidCredentials
                }
                Some(se) if se.is_user_not_confirmed_exception() => {
                    AuthError::Provider("Account is not confirmed yet".to_string())
                }
                _ => AuthError::Provider(format!("Cognito initiate_auth error: {}", e)),
            })?;

        let tokens = result
            .authentication_result()
            .ok_or_else(|| AuthError::Provider("Cognito returned a challenge instead of tokens".to_string()))?;
        let access_token = tokens
            .access_token()
            .ok_or_else(|| AuthError::Provider("Cognito returned no access token".to_string()))?
            .to_string();

        let identity = self.verify(&access_token).await?;
        tracing::info!("🔐 Signed in {} ({})", identity.email, identity.user_id);

        Ok(AuthSession {
            identity,
            access_token,
            refresh_token: tokens.refresh_token().map(|s| s.to_string()),
            expires_in: Some(tokens.expires_in()),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_authorized_exception() => AuthError::Unauthorized,
                _ => AuthError::Provider(format!("Cognito global_sign_out error: {}", e)),
            })?;
        Ok(())
    }

    async fn verify(&self, access_token: &str) -> Result<Identity, AuthError> {
        let user = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_authorized_exception() || se.is_user_not_found_exception() => {
                    AuthError::Unauthorized
                }
                _ => AuthError::Provider(format!("Cognito get_user error: {}", e)),
            })?;

        let attr = |name: &str| {
            user.user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(|v| v.to_string())
        };

        let user_id = attr("sub").ok_or(AuthError::Unauthorized)?;
        let email = attr("email").unwrap_or_else(|| user.username().to_string());
        Ok(Identity { user_id, email })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalAccount {
    user_id: String,
    password_sha256: String,
}

/// Mock-mode provider backed by the local store.
///
/// Any well-formed email/password works; the first password used for an
/// email is remembered and later sign-ins must match it.
pub struct LocalAuth {
    store: Arc<LocalStore>,
}

impl LocalAuth {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Stable id derived from the normalized email
    pub fn user_id_for(email: &str) -> String {
        let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }

    fn password_digest(password: &str) -> String {
        Sha256::digest(password.as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn issue_token(&self, identity: Identity) -> Result<AuthSession, AuthError> {
        let access_token = format!(
            "mock-token-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        self.store
            .update::<HashMap<String, Identity>, _, _>(AUTH_TOKEN_KEY, |tokens| {
                // one live token per user; signing in again replaces it
                tokens.retain(|_, owner| owner.user_id != identity.user_id);
                tokens.insert(access_token.clone(), identity.clone());
                Ok(())
            })
            .map_err(AuthError::Provider)?;

        Ok(AuthSession {
            identity,
            access_token,
            refresh_token: None,
            expires_in: None,
        })
    }

    fn register(&self, email: &str, password: &str, must_be_new: bool) -> Result<Identity, AuthError> {
        let key = email.trim().to_lowercase();
        let digest = Self::password_digest(password);

        let outcome = self
            .store
            .update::<HashMap<String, LocalAccount>, _, _>(USERS_KEY, |accounts| {
                match accounts.get(&key) {
                    Some(_) if must_be_new => Ok(Err(AuthError::UserExists)),
                    Some(account) if account.password_sha256 != digest => {
                        Ok(Err(AuthError::InvalidCredentials))
                    }
                    Some(account) => Ok(Ok(account.user_id.clone())),
                    None => {
                        let user_id = Self::user_id_for(&key);
                        accounts.insert(
                            key.clone(),
                            LocalAccount {
                                user_id: user_id.clone(),
                                password_sha256: digest.clone(),
                            },
                        );
                        Ok(Ok(user_id))
                    }
                }
            })
            .map_err(AuthError::Provider)?;

        Ok(Identity {
            user_id: outcome?,
            email: email.trim().to_string(),
        })
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        check_credentials(email, password)?;
        let identity = self.register(email, password, true)?;
        tracing::info!("✅ Mock sign up {}", identity.email);
        self.issue_token(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        check_credentials(email, password)?;
        let identity = self.register(email, password, false)?;
        tracing::info!("🔐 Mock sign in {}", identity.email);
        self.issue_token(identity)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.store
            .update::<HashMap<String, Identity>, _, _>(AUTH_TOKEN_KEY, |tokens| {
                tokens.remove(access_token);
                Ok(())
            })
            .map_err(AuthError::Provider)
    }

    async fn verify(&self, access_token: &str) -> Result<Identity, AuthError> {
        let tokens: HashMap<String, Identity> = self
            .store
            .get(AUTH_TOKEN_KEY)
            .map_err(AuthError::Provider)?
            .unwrap_or_default();
        tokens.get(access_token).cloned().ok_or(AuthError::Unauthorized)
    }
}

/// Bearer header first, then the `access_token` cookie
pub fn extract_token(authorization: Option<&str>, cookie_header: Option<&str>) -> Option<String> {
    if let Some(token) = authorization
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str, max_age: Option<i32>) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={}",
        ACCESS_TOKEN_COOKIE,
        token,
        max_age.unwrap_or(3600)
    )
}

pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=0", name)
}

/// Resolve the caller, or a 401 response to send back as-is
pub async fn authenticate(
    auth: &dyn AuthProvider,
    authorization: Option<&str>,
    cookie_header: Option<&str>,
) -> Result<Identity, Response<Body>> {
    let unauthorized = |e: &AuthError| {
        error_response(StatusCode::UNAUTHORIZED, &e.to_string()).unwrap_or_else(|_| {
            let mut resp = Response::new(Body::Empty);
            *resp.status_mut() = StatusCode::UNAUTHORIZED;
            resp
        })
    };

    let Some(token) = extract_token(authorization, cookie_header) else {
        return Err(unauthorized(&AuthError::Unauthorized));
    };

    match auth.verify(&token).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            tracing::warn!("⚠️ Token rejected: {}", e);
            Err(unauthorized(&AuthError::Unauthorized))
        }
    }
}

/// Like [`authenticate`] but a missing or bad token just means "signed out"
pub async fn optional_identity(
    auth: &dyn AuthProvider,
    authorization: Option<&str>,
    cookie_header: Option<&str>,
) -> Option<Identity> {
    let token = extract_token(authorization, cookie_header)?;
    auth.verify(&token).await.ok()
}

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn auth_error_response(e: &AuthError) -> Result<Response<Body>, Error> {
    let message = match e {
        AuthError::Provider(_) => "인증 서버에 연결할 수 없습니다. 잠시 후 다시 시도해주세요.".to_string(),
        other => other.to_string(),
    };
    error_response(e.status_code(), &message)
}

async fn session_response(
    points: &dyn PointsService,
    session: AuthSession,
    status: StatusCode,
) -> Result<Response<Body>, Error> {
    let user = match points
        .ensure_account(&session.identity.user_id, &session.identity.email)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("❌ Failed to ensure account {}: {}", session.identity.user_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load account");
        }
    };

    let body = serde_json::json!({
        "user": user,
        "access_token": session.access_token,
        "refresh_token": session.refresh_token,
        "expires_in": session.expires_in,
    });

    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Set-Cookie", session_cookie(&session.access_token, session.expires_in))
        .body(body.to_string().into())
        .map_err(Box::new)?)
}

/// HTTP Handler: POST /signup
pub async fn signup(
    auth: &dyn AuthProvider,
    points: &dyn PointsService,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let Ok(req) = serde_json::from_slice::<CredentialsRequest>(body) else {
        return auth_error_response(&AuthError::MissingCredentials);
    };

    match auth.sign_up(&req.email, &req.password).await {
        Ok(session) => session_response(points, session, StatusCode::CREATED).await,
        Err(e) => auth_error_response(&e),
    }
}

/// HTTP Handler: POST /login
pub async fn login(
    auth: &dyn AuthProvider,
    points: &dyn PointsService,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let Ok(req) = serde_json::from_slice::<CredentialsRequest>(body) else {
        return auth_error_response(&AuthError::MissingCredentials);
    };

    match auth.sign_in(&req.email, &req.password).await {
        Ok(session) => session_response(points, session, StatusCode::OK).await,
        Err(e) => {
            tracing::warn!("⚠️ Login failed for {}: {}", req.email, e);
            auth_error_response(&e)
        }
    }
}

/// HTTP Handler: POST /logout. The cookie is cleared even if the provider call fails.
pub async fn logout(auth: &dyn AuthProvider, token: &str) -> Result<Response<Body>, Error> {
    if let Err(e) = auth.sign_out(token).await {
        tracing::warn!("⚠️ Provider sign-out failed: {}", e);
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Set-Cookie", clear_cookie(ACCESS_TOKEN_COOKIE))
        .body(serde_json::json!({"message": "ok"}).to_string().into())
        .map_err(Box::new)?)
}
