//! # Authentication
//!
//! Bearer-token actor authentication for protected API endpoints. Tokens
//! come from configuration and resolve to an actor identity; the actor id
//! keys rate limiting, and administrative actors bypass it.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};

/// Authenticated caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub is_admin: bool,
}

/// Extractor for the actor resolved by the auth middleware.
#[derive(Debug, Clone)]
pub struct ActorExtension(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for ActorExtension {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ActorExtension>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Request not authenticated")))
    }
}

/// Authentication middleware that validates bearer tokens and resolves the
/// calling actor.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    let actor = resolve_actor(&config, token)?;

    tracing::debug!(actor_id = %actor.id, "Authenticated request");
    request.extensions_mut().insert(ActorExtension(actor));

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

fn resolve_actor(config: &AppConfig, token: &str) -> Result<Actor, ApiError> {
    let matched = config.actor_tokens.iter().find(|entry| {
        ConstantTimeEq::ct_eq(token.as_bytes(), entry.token.as_bytes()).into()
    });

    match matched {
        Some(entry) => Ok(Actor {
            id: entry.actor_id.clone(),
            is_admin: config.admin_actors.contains(&entry.actor_id),
        }),
        None => Err(unauthorized(Some("Invalid bearer token"))),
    }
}
