//! The application facade.
//!
//! [`Arena`] is the single boundary presentation code talks to. It wires the
//! session guard, the pure state machine and the store together, keeps a
//! locally cached snapshot of every collection in sync with the store's
//! change feed, and exposes the command surface as plain `Result`-returning
//! methods whose failures carry user-facing messages.
//!
//! Commands never mutate the cache optimistically: a mutation is validated,
//! persisted, and the cache catches up when the store pushes the fresh
//! snapshot — the same thing every other connected client sees.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config;
use crate::errors::{AppError, CommandError};
use crate::models::*;
use crate::session::{self, AdminToken};
use crate::store::{ChangeEvent, Store};

#[derive(Debug, Default, Clone)]
struct Snapshot {
    teams: Vec<Team>,
    issues: Vec<Issue>,
    repositories: Vec<Repository>,
}

#[derive(Clone)]
pub struct Arena {
    store: Store,
    cache: Arc<RwLock<Snapshot>>,
}

impl Arena {
    /// Build the facade over an already-migrated store.
    ///
    /// Runs the initialization contract first — seed empty collections,
    /// force every `active` flag off — and only then takes the initial
    /// snapshot and starts following the change feed. Must be called from
    /// within a tokio runtime.
    pub fn new(store: Store) -> Result<Self> {
        let team_names: Vec<&str> = config::ALLOWED_TEAMS.iter().map(|t| t.name).collect();
        store.seed_teams(&team_names)?;
        store.seed_repositories(config::INITIAL_REPOSITORIES)?;
        store.seed_issues(config::INITIAL_ISSUES)?;
        store.reset_active_flags()?;

        let cache = Arc::new(RwLock::new(Snapshot {
            teams: store.all_teams()?,
            issues: store.all_issues()?,
            repositories: store.all_repositories()?,
        }));

        let arena = Self { store, cache };
        arena.spawn_cache_follower();
        Ok(arena)
    }

    /// Keep the cached snapshot current with the store's change feed.
    fn spawn_cache_follower(&self) {
        let mut rx = self.store.feed().subscribe();
        let cache = self.cache.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let mut snap = cache.write().expect("cache lock poisoned");
                        match event {
                            ChangeEvent::Teams(teams) => snap.teams = teams,
                            ChangeEvent::Issues(issues) => snap.issues = issues,
                            ChangeEvent::Repositories(repos) => snap.repositories = repos,
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped snapshots are fine as long as we resync to
                        // the latest state.
                        tracing::debug!("Cache follower lagged by {skipped} events; resyncing");
                        let refreshed = (
                            store.all_teams(),
                            store.all_issues(),
                            store.all_repositories(),
                        );
                        if let (Ok(teams), Ok(issues), Ok(repos)) = refreshed {
                            let mut snap = cache.write().expect("cache lock poisoned");
                            snap.teams = teams;
                            snap.issues = issues;
                            snap.repositories = repos;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ============================================================
    // Queries (served from the cached snapshot)
    // ============================================================

    /// All teams, ranked by points.
    pub fn teams(&self) -> Vec<Team> {
        self.cache.read().expect("cache lock poisoned").teams.clone()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.cache.read().expect("cache lock poisoned").issues.clone()
    }

    pub fn issues_by_repo(&self, repo: &str) -> Vec<Issue> {
        self.cache
            .read()
            .expect("cache lock poisoned")
            .issues
            .iter()
            .filter(|i| i.repo == repo)
            .cloned()
            .collect()
    }

    pub fn occupied_issues(&self) -> Vec<Issue> {
        self.cache
            .read()
            .expect("cache lock poisoned")
            .issues
            .iter()
            .filter(|i| i.status() == IssueStatus::Occupied)
            .cloned()
            .collect()
    }

    pub fn repositories(&self) -> Vec<Repository> {
        self.cache
            .read()
            .expect("cache lock poisoned")
            .repositories
            .clone()
    }

    /// Subscribe to the raw change feed (full snapshots per event).
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.store.feed().subscribe()
    }

    // ============================================================
    // Session commands
    // ============================================================

    pub fn login_team(&self, name: &str, password: &str) -> Result<Team, AppError> {
        session::login_team(&self.store, name, password)
    }

    pub fn logout_team(&self, name: &str) -> Result<(), AppError> {
        session::logout_team(&self.store, name)
    }

    pub fn login_admin(&self, username: &str, password: &str) -> Result<&'static str, AppError> {
        session::login_admin(username, password)
    }

    /// Admin sessions are client-held; there is nothing to tear down
    /// server-side.
    pub fn logout_admin(&self) {}

    // ============================================================
    // Team commands
    // ============================================================

    /// Claim an open issue for the acting team, starting its countdown.
    pub fn occupy_issue(&self, team: &str, issue_id: Uuid) -> Result<Issue, AppError> {
        session::require_active(&self.store, team)?;
        self.store.occupy_issue(issue_id, team, Utc::now())
    }

    /// Submit a pull request and close an issue the acting team occupies.
    pub fn close_issue(&self, team: &str, issue_id: Uuid, pr_url: &str) -> Result<Issue, AppError> {
        session::require_active(&self.store, team)?;
        self.store.close_issue(issue_id, team, pr_url, Utc::now())
    }

    // ============================================================
    // Admin commands
    // ============================================================

    pub fn review_pr(
        &self,
        _admin: &AdminToken,
        issue_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<Issue, AppError> {
        self.store.review_issue(issue_id, decision)
    }

    /// Ad-hoc point adjustment, clamped at a floor of zero like every other
    /// point mutation.
    pub fn award_points(
        &self,
        _admin: &AdminToken,
        team: &str,
        points: i64,
    ) -> Result<(), AppError> {
        if !self.store.adjust_points(team, points)? {
            return Err(CommandError::NotFound("Team").into());
        }
        Ok(())
    }

    /// Admin override: re-assign or un-assign an issue.
    pub fn assign_issue(
        &self,
        _admin: &AdminToken,
        issue_id: Uuid,
        team: Option<&str>,
    ) -> Result<Issue, AppError> {
        self.store.force_assign_issue(issue_id, team, Utc::now())
    }

    /// Admin override: force an issue into a target status.
    pub fn move_issue(
        &self,
        _admin: &AdminToken,
        issue_id: Uuid,
        status: IssueStatus,
    ) -> Result<Issue, AppError> {
        self.store.force_status_issue(issue_id, status, Utc::now())
    }

    pub fn add_issue(&self, _admin: &AdminToken, input: CreateIssueInput) -> Result<Issue, AppError> {
        self.store.create_issue(input)
    }

    pub fn delete_issue(&self, _admin: &AdminToken, issue_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_issue(issue_id)? {
            return Err(CommandError::NotFound("Issue").into());
        }
        Ok(())
    }

    pub fn add_repository(
        &self,
        _admin: &AdminToken,
        input: CreateRepositoryInput,
    ) -> Result<Repository, AppError> {
        self.store.create_repository(input)
    }

    pub fn delete_repository(&self, _admin: &AdminToken, name: &str) -> Result<(), AppError> {
        if !self.store.delete_repository(name)? {
            return Err(CommandError::NotFound("Repository").into());
        }
        Ok(())
    }

    // ============================================================
    // Sweeper entry point
    // ============================================================

    /// Apply an expiry if the issue is overdue right now. Invoked by the
    /// sweeper; safe to call redundantly, returns whether anything expired.
    pub fn expire_issue(&self, issue_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.store.expire_issue(issue_id, now)
    }
}
