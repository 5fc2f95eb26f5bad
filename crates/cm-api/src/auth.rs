use axum::async_trait;
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use clap::ValueEnum;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    Jwt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum JwtAlgorithm {
    Hs256,
    Hs384,
    Hs512,
    Rs256,
    Es256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtKeyKind {
    Secret,
    RsaPem,
    EcPem,
}

impl JwtAlgorithm {
    pub fn algorithm(self) -> Algorithm {
        match self {
            JwtAlgorithm::Hs256 => Algorithm::HS256,
            JwtAlgorithm::Hs384 => Algorithm::HS384,
            JwtAlgorithm::Hs512 => Algorithm::HS512,
            JwtAlgorithm::Rs256 => Algorithm::RS256,
            JwtAlgorithm::Es256 => Algorithm::ES256,
        }
    }

    pub fn key_kind(self) -> JwtKeyKind {
        match self {
            JwtAlgorithm::Hs256 | JwtAlgorithm::Hs384 | JwtAlgorithm::Hs512 => JwtKeyKind::Secret,
            JwtAlgorithm::Rs256 => JwtKeyKind::RsaPem,
            JwtAlgorithm::Es256 => JwtKeyKind::EcPem,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwt_public_key: Option<String>,
    pub jwt_algorithm: JwtAlgorithm,
}

/// The caller behind a request. Service callers authenticated by API key may
/// act for any user; JWT callers only for their own `sub`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
    pub via_api_key: bool,
}

impl AuthUser {
    pub fn ensure_can_act_for(&self, user_id: &str) -> Result<(), ApiError> {
        if self.via_api_key || self.subject == user_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "{} may not act for {user_id}",
                self.subject
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);

        match config.mode {
            AuthMode::ApiKey => authorize_api_key(parts, &config),
            AuthMode::Jwt => authorize_jwt(parts, &config),
        }
    }
}

fn authorize_api_key(parts: &Parts, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    let expected = config
        .api_key
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing CM_API_KEY".into()))?;

    let provided = parts
        .headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing X-API-Key header".into()))?;

    if provided != expected {
        return Err(ApiError::Unauthorized("invalid API key".into()));
    }

    Ok(AuthUser {
        subject: "api_key".to_string(),
        via_api_key: true,
    })
}

fn decoding_key(config: &AuthConfig) -> Result<DecodingKey, ApiError> {
    match config.jwt_algorithm.key_kind() {
        JwtKeyKind::Secret => config
            .jwt_secret
            .as_deref()
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()))
            .ok_or_else(|| ApiError::Unauthorized("missing JWT_SECRET".into())),
        JwtKeyKind::RsaPem => {
            let pem = public_key(config)?;
            DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|err| ApiError::Internal(format!("invalid JWT_PUBLIC_KEY: {err}")))
        }
        JwtKeyKind::EcPem => {
            let pem = public_key(config)?;
            DecodingKey::from_ec_pem(pem.as_bytes())
                .map_err(|err| ApiError::Internal(format!("invalid JWT_PUBLIC_KEY: {err}")))
        }
    }
}

fn public_key(config: &AuthConfig) -> Result<&str, ApiError> {
    config
        .jwt_public_key
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing JWT_PUBLIC_KEY".into()))
}

fn authorize_jwt(parts: &Parts, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    let key = decoding_key(config)?;

    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected Bearer token".into()))?;

    let validation = Validation::new(config.jwt_algorithm.algorithm());

    let data = decode::<Claims>(token, &key, &validation)
        .map_err(|err| ApiError::Unauthorized(format!("invalid token: {err}")))?;

    Ok(AuthUser {
        subject: data.claims.sub,
        via_api_key: false,
    })
}
