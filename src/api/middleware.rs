//! Bearer-token check for the admin routes.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::session;

/// Require a valid admin bearer token; on success the [`session::AdminToken`]
/// capability is stashed in request extensions for the handler.
pub async fn require_admin(mut request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            let bearer = &header[7..];
            match session::verify_admin(bearer) {
                Some(token) => {
                    request.extensions_mut().insert(token);
                    Ok(next.run(request).await)
                }
                None => {
                    tracing::warn!("Invalid admin token provided");
                    Err(StatusCode::UNAUTHORIZED)
                }
            }
        }
        Some(_) => {
            tracing::warn!("Invalid Authorization header format");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing Authorization header on admin route");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
