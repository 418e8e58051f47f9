mod handlers;
mod middleware;

use axum::{
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app::Arena;

pub fn create_router(arena: Arena) -> Router {
    // Admin routes first, wrapped by the bearer check; the login/logout
    // routes are added after `route_layer` so they stay reachable without a
    // token.
    let admin = Router::new()
        .route("/issues", post(handlers::add_issue))
        .route("/issues/{id}", delete(handlers::delete_issue))
        .route("/issues/{id}/review", post(handlers::review_pr))
        .route("/issues/{id}/assign", post(handlers::assign_issue))
        .route("/issues/{id}/status", post(handlers::move_issue))
        .route("/teams/{name}/award", post(handlers::award_points))
        .route("/repositories", post(handlers::add_repository))
        .route("/repositories/{name}", delete(handlers::delete_repository))
        .route_layer(from_fn(middleware::require_admin))
        .route("/login", post(handlers::login_admin))
        .route("/logout", post(handlers::logout_admin));

    let api = Router::new()
        // Sessions
        .route("/login", post(handlers::login_team))
        .route("/logout", post(handlers::logout_team))
        // Collections
        .route("/teams", get(handlers::list_teams))
        .route("/repositories", get(handlers::list_repositories))
        .route("/issues", get(handlers::list_issues))
        // Issue lifecycle
        .route("/issues/{id}/occupy", post(handlers::occupy_issue))
        .route("/issues/{id}/close", post(handlers::close_issue))
        // Real-time snapshots
        .route("/events", get(handlers::events))
        // Health
        .route("/health", get(handlers::health))
        .nest("/admin", admin);

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(arena)
}
