use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Extension, Json,
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::app::Arena;
use crate::errors::{AppError, CommandError};
use crate::models::*;
use crate::session::AdminToken;
use crate::store::ChangeEvent;

// ============================================================
// Error Handling
// ============================================================

/// Map a facade failure onto a status code and a body the UI can show
/// verbatim. Store faults are logged server-side and sanitised; typed
/// command failures are user-correctable and pass through as-is.
fn app_error(e: AppError) -> (StatusCode, String) {
    match e {
        AppError::Command(cmd) => (status_for(&cmd), cmd.to_string()),
        AppError::Store(e) => {
            tracing::error!("Store error: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn status_for(cmd: &CommandError) -> StatusCode {
    match cmd {
        CommandError::UnknownTeam
        | CommandError::BadCredentials
        | CommandError::SessionNotActive => StatusCode::UNAUTHORIZED,
        CommandError::AlreadyActive
        | CommandError::AlreadyOccupied
        | CommandError::QuotaExceeded { .. } => StatusCode::CONFLICT,
        CommandError::NotOwner => StatusCode::FORBIDDEN,
        CommandError::InvalidState | CommandError::InvalidPrUrl => StatusCode::UNPROCESSABLE_ENTITY,
        CommandError::NotFound(_) => StatusCode::NOT_FOUND,
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Sessions
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TeamLoginInput {
    pub team: String,
    pub password: String,
}

pub async fn login_team(
    State(arena): State<Arena>,
    Json(input): Json<TeamLoginInput>,
) -> Result<Json<Team>, (StatusCode, String)> {
    arena
        .login_team(&input.team, &input.password)
        .map(Json)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct TeamLogoutInput {
    pub team: String,
}

pub async fn logout_team(
    State(arena): State<Arena>,
    Json(input): Json<TeamLogoutInput>,
) -> Result<StatusCode, (StatusCode, String)> {
    arena
        .logout_team(&input.team)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub token: String,
}

pub async fn login_admin(
    State(arena): State<Arena>,
    Json(input): Json<AdminLoginInput>,
) -> Result<Json<AdminLoginResponse>, (StatusCode, String)> {
    arena
        .login_admin(&input.username, &input.password)
        .map(|token| {
            Json(AdminLoginResponse {
                token: token.to_string(),
            })
        })
        .map_err(app_error)
}

pub async fn logout_admin(State(arena): State<Arena>) -> StatusCode {
    arena.logout_admin();
    StatusCode::NO_CONTENT
}

// ============================================================
// Collections
// ============================================================

pub async fn list_teams(State(arena): State<Arena>) -> Json<Vec<Team>> {
    Json(arena.teams())
}

pub async fn list_repositories(State(arena): State<Arena>) -> Json<Vec<Repository>> {
    Json(arena.repositories())
}

#[derive(Debug, Deserialize)]
pub struct ListIssuesQuery {
    pub repo: Option<String>,
}

pub async fn list_issues(
    State(arena): State<Arena>,
    Query(query): Query<ListIssuesQuery>,
) -> Json<Vec<Issue>> {
    match query.repo {
        Some(repo) => Json(arena.issues_by_repo(&repo)),
        None => Json(arena.issues()),
    }
}

// ============================================================
// Issue lifecycle (team commands)
// ============================================================

#[derive(Debug, Deserialize)]
pub struct OccupyInput {
    pub team: String,
}

pub async fn occupy_issue(
    State(arena): State<Arena>,
    Path(id): Path<Uuid>,
    Json(input): Json<OccupyInput>,
) -> Result<Json<Issue>, (StatusCode, String)> {
    arena
        .occupy_issue(&input.team, id)
        .map(Json)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct CloseInput {
    pub team: String,
    pub pr_url: String,
}

pub async fn close_issue(
    State(arena): State<Arena>,
    Path(id): Path<Uuid>,
    Json(input): Json<CloseInput>,
) -> Result<Json<Issue>, (StatusCode, String)> {
    arena
        .close_issue(&input.team, id, &input.pr_url)
        .map(Json)
        .map_err(app_error)
}

// ============================================================
// Admin commands
// ============================================================

pub async fn add_issue(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Json(input): Json<CreateIssueInput>,
) -> Result<(StatusCode, Json<Issue>), (StatusCode, String)> {
    arena
        .add_issue(&admin, input)
        .map(|i| (StatusCode::CREATED, Json(i)))
        .map_err(app_error)
}

pub async fn delete_issue(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    arena
        .delete_issue(&admin, id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    pub decision: ReviewDecision,
}

pub async fn review_pr(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Path(id): Path<Uuid>,
    Json(input): Json<ReviewInput>,
) -> Result<Json<Issue>, (StatusCode, String)> {
    arena
        .review_pr(&admin, id, input.decision)
        .map(Json)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct AssignInput {
    pub team: Option<String>,
}

pub async fn assign_issue(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Path(id): Path<Uuid>,
    Json(input): Json<AssignInput>,
) -> Result<Json<Issue>, (StatusCode, String)> {
    arena
        .assign_issue(&admin, id, input.team.as_deref())
        .map(Json)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct MoveInput {
    pub status: IssueStatus,
}

pub async fn move_issue(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Path(id): Path<Uuid>,
    Json(input): Json<MoveInput>,
) -> Result<Json<Issue>, (StatusCode, String)> {
    arena
        .move_issue(&admin, id, input.status)
        .map(Json)
        .map_err(app_error)
}

#[derive(Debug, Deserialize)]
pub struct AwardInput {
    pub points: i64,
}

pub async fn award_points(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Path(name): Path<String>,
    Json(input): Json<AwardInput>,
) -> Result<StatusCode, (StatusCode, String)> {
    arena
        .award_points(&admin, &name, input.points)
        .map(|_| StatusCode::OK)
        .map_err(app_error)
}

pub async fn add_repository(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Json(input): Json<CreateRepositoryInput>,
) -> Result<(StatusCode, Json<Repository>), (StatusCode, String)> {
    arena
        .add_repository(&admin, input)
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(app_error)
}

pub async fn delete_repository(
    State(arena): State<Arena>,
    Extension(admin): Extension<AdminToken>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    arena
        .delete_repository(&admin, &name)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(app_error)
}

// ============================================================
// Real-time snapshots
// ============================================================

/// Stream full-snapshot change events as SSE, mirroring the push semantics
/// of the document store: whole collection per event, latest wins.
pub async fn events(
    State(arena): State<Arena>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = arena.subscribe();
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    let event = match &change {
                        ChangeEvent::Teams(teams) => {
                            Event::default().event("teams").json_data(teams)
                        }
                        ChangeEvent::Issues(issues) => {
                            Event::default().event("issues").json_data(issues)
                        }
                        ChangeEvent::Repositories(repos) => {
                            Event::default().event("repositories").json_data(repos)
                        }
                    };
                    match event {
                        Ok(event) => return Some((Ok(event), rx)),
                        Err(e) => {
                            tracing::warn!("Failed to serialise change event: {e}");
                            continue;
                        }
                    }
                }
                // A lagged subscriber only missed intermediate snapshots;
                // the next event carries the full current state.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
