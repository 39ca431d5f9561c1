use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::application::access::Actor;
use crate::bootstrap::app_context::AppContext;
use crate::bootstrap::config::Config;

/// Tokens are issued by the account service; `sub` carries the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub struct Bearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // 1) Prefer Authorization header if present
        if let Some(auth) = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            if let Some(t) = auth.strip_prefix("Bearer ") {
                return Ok(Bearer(t.to_string()));
            }
        }

        // 2) Fallback to HttpOnly cookie `access_token`
        if let Some(cookie_hdr) = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            if let Some(token) = get_cookie(cookie_hdr, "access_token") {
                return Ok(Bearer(token));
            }
        }

        Err(StatusCode::UNAUTHORIZED)
    }
}

pub(crate) fn validate_bearer(cfg: &Config, bearer: Bearer) -> Result<i64, StatusCode> {
    let data = jsonwebtoken::decode::<Claims>(
        &bearer.0,
        &DecodingKey::from_secret(cfg.jwt_secret_pem.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;
    data.claims
        .sub
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

/// The signed-in caller with the relations access rules need.
pub async fn authenticate(ctx: &AppContext, bearer: Bearer) -> Result<Actor, StatusCode> {
    let user_id = validate_bearer(&ctx.cfg, bearer)?;
    ctx.user_repo()
        .find_actor(user_id)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, user_id, "actor_lookup_failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)
}

/// Like `authenticate`, but anonymous callers (no or invalid token) get `None`.
pub async fn optional_actor(
    ctx: &AppContext,
    bearer: Option<Bearer>,
) -> Result<Option<Actor>, StatusCode> {
    let Some(bearer) = bearer else {
        return Ok(None);
    };
    match authenticate(ctx, bearer).await {
        Ok(actor) => Ok(Some(actor)),
        Err(StatusCode::UNAUTHORIZED) => Ok(None),
        Err(status) => Err(status),
    }
}

fn get_cookie(cookie_header: &str, name: &str) -> Option<String> {
    for part in cookie_header.split(';') {
        let kv = part.trim();
        if let Some((k, v)) = kv.split_once('=') {
            if k.trim() == name {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}
