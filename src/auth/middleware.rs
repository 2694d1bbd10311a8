use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::service::TokenService;
use crate::api::ApiError;

fn extract_bearer(request: &Request<Body>) -> Result<&str, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid token format"))
}

/// Client-facing auth: any valid bearer token passes; claims are injected as
/// a request extension for handlers that care about the caller identity.
pub async fn bearer_auth_middleware(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&request)?;

    match tokens.verify_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(_) => Err(ApiError::unauthorized("Invalid or expired token")),
    }
}

/// Service-to-service auth: requires the coordinator-minted administrative
/// token (the `svc` claim). Guards the 2PC verbs and the reconcile endpoint.
pub async fn service_auth_middleware(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&request)?;

    match tokens.verify_token(token) {
        Ok(claims) if claims.svc => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Ok(_) => Err(ApiError::unauthorized("Service token required")),
        Err(_) => Err(ApiError::unauthorized("Invalid or expired token")),
    }
}
