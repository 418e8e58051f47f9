//! SQLite-backed state store.
//!
//! The durable owner of teams, repositories and issues, plus the change
//! feed that pushes fresh snapshots to subscribers after every committed
//! mutation.
//!
//! Commands are modelled as read-then-write races between independent
//! clients, so every lifecycle mutation here runs inside one transaction
//! and conditions its write on the state it read (`WHERE ... AND status =
//! ?`). A raced loser sees zero affected rows and gets the matching typed
//! error instead of silently overwriting the winner. Point changes are
//! always deltas with a floor-at-zero clamp applied in SQL, never blind
//! overwrites.

mod feed;
mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use uuid::Uuid;

use crate::domain;
use crate::errors::{AppError, CommandError};
use crate::models::*;

pub use feed::{ChangeEvent, ChangeFeed};

pub struct Store {
    conn: Arc<Mutex<Connection>>,
    feed: ChangeFeed,
}

impl Store {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Store path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            feed: ChangeFeed::new(),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "code-arena")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("arena.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            feed: ChangeFeed::new(),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        schema::run_migrations(&conn)
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    // ============================================================
    // Team operations
    // ============================================================

    /// All teams, ranked by points.
    pub fn all_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT name, points, active FROM teams ORDER BY points DESC, name",
        )?;

        let teams = stmt
            .query_map([], |row| {
                Ok(Team {
                    name: row.get(0)?,
                    points: row.get(1)?,
                    active: row.get::<_, i64>(2)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(teams)
    }

    pub fn get_team(&self, name: &str) -> Result<Option<Team>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare("SELECT name, points, active FROM teams WHERE name = ?")?;

        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Team {
                name: row.get(0)?,
                points: row.get(1)?,
                active: row.get::<_, i64>(2)? != 0,
            }))
        } else {
            Ok(None)
        }
    }

    /// Insert any allow-listed teams that do not exist yet, with zero points
    /// and no session.
    pub fn seed_teams(&self, names: &[&str]) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store lock poisoned");
            for name in names {
                conn.execute(
                    "INSERT OR IGNORE INTO teams (name, points, active) VALUES (?, 0, 0)",
                    [*name],
                )?;
            }
        }
        self.publish_teams()?;
        Ok(())
    }

    /// Force every team's `active` flag to false. Runs at start-up so
    /// sessions abandoned in dead browser tabs do not lock teams out.
    pub fn reset_active_flags(&self) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store lock poisoned");
            conn.execute("UPDATE teams SET active = 0", [])?;
        }
        self.publish_teams()?;
        Ok(())
    }

    /// Conditionally open a session: flips `active` to true only if it is
    /// currently false. Returns false when the flag was already set, which
    /// is how a raced double-login loses cleanly.
    pub fn try_activate(&self, name: &str) -> Result<bool> {
        let rows = {
            let conn = self.conn.lock().expect("store lock poisoned");
            conn.execute(
                "UPDATE teams SET active = 1 WHERE name = ? AND active = 0",
                [name],
            )?
        };
        if rows > 0 {
            self.publish_teams()?;
        }
        Ok(rows > 0)
    }

    /// Close a session. Idempotent: deactivating an inactive team is a no-op.
    pub fn deactivate(&self, name: &str) -> Result<()> {
        let rows = {
            let conn = self.conn.lock().expect("store lock poisoned");
            conn.execute("UPDATE teams SET active = 0 WHERE name = ?", [name])?
        };
        if rows > 0 {
            self.publish_teams()?;
        }
        Ok(())
    }

    /// Apply a point delta, clamped at a floor of zero. Returns false if the
    /// team does not exist.
    pub fn adjust_points(&self, name: &str, delta: i64) -> Result<bool> {
        let rows = {
            let conn = self.conn.lock().expect("store lock poisoned");
            conn.execute(
                "UPDATE teams SET points = MAX(0, points + ?) WHERE name = ?",
                (delta, name),
            )?
        };
        if rows > 0 {
            self.publish_teams()?;
        }
        Ok(rows > 0)
    }

    // ============================================================
    // Repository operations
    // ============================================================

    pub fn all_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare("SELECT name, url FROM repositories ORDER BY name")?;

        let repos = stmt
            .query_map([], |row| {
                Ok(Repository {
                    name: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    pub fn seed_repositories(&self, repos: &[(&str, &str)]) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store lock poisoned");
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM repositories", [], |row| {
                row.get(0)
            })?;
            if count > 0 {
                return Ok(());
            }
            for (name, url) in repos {
                conn.execute(
                    "INSERT INTO repositories (name, url) VALUES (?, ?)",
                    (*name, *url),
                )?;
            }
        }
        self.publish_repositories()?;
        Ok(())
    }

    /// Register a repository. Names are unique; registering a taken name
    /// keeps the existing row and returns it instead of overwriting the URL.
    pub fn create_repository(&self, input: CreateRepositoryInput) -> Result<Repository, AppError> {
        let (repo, inserted) = {
            let conn = self.conn.lock().expect("store lock poisoned");
            let rows = conn.execute(
                "INSERT OR IGNORE INTO repositories (name, url) VALUES (?, ?)",
                (&input.name, &input.url),
            )?;
            if rows == 0 {
                let url: String = conn.query_row(
                    "SELECT url FROM repositories WHERE name = ?",
                    [&input.name],
                    |row| row.get(0),
                )?;
                (Repository {
                    name: input.name,
                    url,
                }, false)
            } else {
                (Repository {
                    name: input.name,
                    url: input.url,
                }, true)
            }
        };
        if inserted {
            self.publish_repositories()?;
        }
        Ok(repo)
    }

    pub fn delete_repository(&self, name: &str) -> Result<bool> {
        let rows = {
            let conn = self.conn.lock().expect("store lock poisoned");
            conn.execute("DELETE FROM repositories WHERE name = ?", [name])?
        };
        if rows > 0 {
            self.publish_repositories()?;
        }
        Ok(rows > 0)
    }

    // ============================================================
    // Issue operations
    // ============================================================

    pub fn all_issues(&self) -> Result<Vec<Issue>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues ORDER BY created_at, id"
        ))?;

        let issues = stmt
            .query_map([], issue_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(issues)
    }

    pub fn get_issue(&self, id: Uuid) -> Result<Option<Issue>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        read_issue(&conn, id)
    }

    pub fn create_issue(&self, input: CreateIssueInput) -> Result<Issue, AppError> {
        let issue = {
            let conn = self.conn.lock().expect("store lock poisoned");
            insert_issue(&conn, input, Utc::now())?
        };
        self.publish_issues()?;
        Ok(issue)
    }

    /// Insert the starter issues, but only into an empty collection.
    pub fn seed_issues(&self, fixtures: &[(&str, &str, &str)]) -> Result<()> {
        {
            let conn = self.conn.lock().expect("store lock poisoned");
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
            if count > 0 {
                return Ok(());
            }
            let now = Utc::now();
            for (title, tag, repo) in fixtures {
                insert_issue(
                    &conn,
                    CreateIssueInput {
                        title: title.to_string(),
                        tags: vec![tag.to_string()],
                        repo: repo.to_string(),
                    },
                    now,
                )?;
            }
        }
        self.publish_issues()?;
        Ok(())
    }

    pub fn delete_issue(&self, id: Uuid) -> Result<bool> {
        let rows = {
            let conn = self.conn.lock().expect("store lock poisoned");
            conn.execute("DELETE FROM issues WHERE id = ?", [id.to_string()])?
        };
        if rows > 0 {
            self.publish_issues()?;
        }
        Ok(rows > 0)
    }

    /// A team claims an open issue. Quota count and the conditional state
    /// write share one transaction, so two racing claimants cannot both win
    /// and a team cannot sneak past the cap.
    pub fn occupy_issue(
        &self,
        id: Uuid,
        team: &str,
        now: DateTime<Utc>,
    ) -> Result<Issue, AppError> {
        let issue = {
            let mut conn = self.conn.lock().expect("store lock poisoned");
            let tx = conn.transaction().map_err(anyhow::Error::from)?;
            let issue = read_issue(&tx, id)?.ok_or(CommandError::NotFound("Issue"))?;
            let held = occupied_count(&tx, team)?;
            let state = domain::occupy(&issue, team, held, now)?;
            let rows = apply_state(&tx, id, IssueStatus::Open, &state, None)?;
            if rows == 0 {
                return Err(CommandError::AlreadyOccupied.into());
            }
            tx.commit().map_err(anyhow::Error::from)?;
            Issue { state, ..issue }
        };
        self.publish_issues()?;
        Ok(issue)
    }

    /// The occupying team submits a PR and closes the issue.
    pub fn close_issue(
        &self,
        id: Uuid,
        team: &str,
        pr_url: &str,
        now: DateTime<Utc>,
    ) -> Result<Issue, AppError> {
        let issue = {
            let mut conn = self.conn.lock().expect("store lock poisoned");
            let tx = conn.transaction().map_err(anyhow::Error::from)?;
            let issue = read_issue(&tx, id)?.ok_or(CommandError::NotFound("Issue"))?;
            let state = domain::close(&issue, team, pr_url, now)?;
            let rows = apply_state(&tx, id, IssueStatus::Occupied, &state, None)?;
            if rows == 0 {
                return Err(CommandError::InvalidState.into());
            }
            tx.commit().map_err(anyhow::Error::from)?;
            Issue { state, ..issue }
        };
        self.publish_issues()?;
        Ok(issue)
    }

    /// Admin review decision. A merge pays the reward to the assignee inside
    /// the same transaction that flips `pr_status` and sets the
    /// `points_awarded` marker, so the reward is exactly-once even across
    /// repeated merge decisions.
    pub fn review_issue(
        &self,
        id: Uuid,
        decision: ReviewDecision,
    ) -> Result<Issue, AppError> {
        let (issue, awarded) = {
            let mut conn = self.conn.lock().expect("store lock poisoned");
            let tx = conn.transaction().map_err(anyhow::Error::from)?;
            let issue = read_issue(&tx, id)?.ok_or(CommandError::NotFound("Issue"))?;
            let review = domain::review(&issue, decision)?;
            let awarded = review.award.is_some();
            let marker = issue.points_awarded || awarded;
            let rows = apply_state(&tx, id, IssueStatus::Closed, &review.state, Some(marker))?;
            if rows == 0 {
                return Err(CommandError::InvalidState.into());
            }
            if let Some((team, reward)) = &review.award {
                adjust_points_in(&tx, team, *reward)?;
            }
            tx.commit().map_err(anyhow::Error::from)?;
            (
                Issue {
                    state: review.state,
                    points_awarded: marker,
                    ..issue
                },
                awarded,
            )
        };
        self.publish_issues()?;
        if awarded {
            self.publish_teams()?;
        }
        Ok(issue)
    }

    /// Reclaim an overdue occupied issue: penalise the assignee and reset
    /// the issue to open, atomically. The reset is conditioned on the exact
    /// `occupied_at` the expiry decision was based on, so an issue that was
    /// closed and re-occupied in the meantime is left alone. Returns false
    /// when there was nothing to expire, which makes redundant sweeps
    /// harmless.
    pub fn expire_issue(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let expired = {
            let mut conn = self.conn.lock().expect("store lock poisoned");
            let tx = conn.transaction().map_err(anyhow::Error::from)?;
            let Some(issue) = read_issue(&tx, id)? else {
                return Ok(false);
            };
            let Some(expiry) = domain::expire(&issue, now) else {
                return Ok(false);
            };
            let rows = tx.execute(
                "UPDATE issues SET status = 'open', assigned_to = NULL, occupied_at = NULL,
                        closed_at = NULL, pr_url = NULL, pr_status = NULL
                 WHERE id = ? AND status = 'occupied' AND occupied_at = ?",
                (id.to_string(), expiry.occupied_at.to_rfc3339()),
            )?;
            if rows == 0 {
                // Lost a race against a close, an admin override or another
                // sweep; nothing to penalise.
                return Ok(false);
            }
            adjust_points_in(&tx, &expiry.team, -expiry.penalty)?;
            tx.commit().map_err(anyhow::Error::from)?;
            true
        };
        self.publish_issues()?;
        self.publish_teams()?;
        Ok(expired)
    }

    /// Admin override: rebuild the issue state around a new assignee.
    pub fn force_assign_issue(
        &self,
        id: Uuid,
        team: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Issue, AppError> {
        let issue = {
            let mut conn = self.conn.lock().expect("store lock poisoned");
            let tx = conn.transaction().map_err(anyhow::Error::from)?;
            let issue = read_issue(&tx, id)?.ok_or(CommandError::NotFound("Issue"))?;
            let state = domain::force_assign(&issue, team, now);
            apply_state_unconditional(&tx, id, &state)?;
            tx.commit().map_err(anyhow::Error::from)?;
            Issue { state, ..issue }
        };
        self.publish_issues()?;
        Ok(issue)
    }

    /// Admin override: force the issue into a target status.
    pub fn force_status_issue(
        &self,
        id: Uuid,
        target: IssueStatus,
        now: DateTime<Utc>,
    ) -> Result<Issue, AppError> {
        let issue = {
            let mut conn = self.conn.lock().expect("store lock poisoned");
            let tx = conn.transaction().map_err(anyhow::Error::from)?;
            let issue = read_issue(&tx, id)?.ok_or(CommandError::NotFound("Issue"))?;
            let state = domain::force_status(&issue, target, now)?;
            apply_state_unconditional(&tx, id, &state)?;
            tx.commit().map_err(anyhow::Error::from)?;
            Issue { state, ..issue }
        };
        self.publish_issues()?;
        Ok(issue)
    }

    // ============================================================
    // Snapshot publication
    // ============================================================

    fn publish_teams(&self) -> Result<()> {
        let teams = self.all_teams()?;
        self.feed.publish(ChangeEvent::Teams(teams));
        Ok(())
    }

    fn publish_issues(&self) -> Result<()> {
        let issues = self.all_issues()?;
        self.feed.publish(ChangeEvent::Issues(issues));
        Ok(())
    }

    fn publish_repositories(&self) -> Result<()> {
        let repos = self.all_repositories()?;
        self.feed.publish(ChangeEvent::Repositories(repos));
        Ok(())
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            feed: self.feed.clone(),
        }
    }
}

const ISSUE_COLUMNS: &str = "id, title, tags, repo, status, assigned_to, occupied_at, \
                             closed_at, pr_url, pr_status, points_awarded, created_at";

fn read_issue(conn: &Connection, id: Uuid) -> Result<Option<Issue>> {
    let mut stmt = conn.prepare(&format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(issue_from_row(row)?)),
        None => Ok(None),
    }
}

fn insert_issue(
    conn: &Connection,
    input: CreateIssueInput,
    now: DateTime<Utc>,
) -> Result<Issue, AppError> {
    let id = Uuid::new_v4();
    let tags_json = serde_json::to_string(&input.tags).map_err(anyhow::Error::from)?;
    conn.execute(
        "INSERT INTO issues (id, title, tags, repo, status, points_awarded, created_at)
         VALUES (?, ?, ?, ?, 'open', 0, ?)",
        (
            id.to_string(),
            &input.title,
            &tags_json,
            &input.repo,
            now.to_rfc3339(),
        ),
    )?;
    Ok(Issue {
        id,
        title: input.title,
        tags: input.tags,
        repo: input.repo,
        state: IssueState::Open,
        points_awarded: false,
        created_at: now,
    })
}

fn issue_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Issue> {
    let tags_json: String = row.get(2)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let status: String = row.get(4)?;
    let assigned_to: Option<String> = row.get(5)?;
    let occupied_at: Option<String> = row.get(6)?;
    let closed_at: Option<String> = row.get(7)?;
    let pr_url: Option<String> = row.get(8)?;
    let pr_status: Option<String> = row.get(9)?;

    let state = decode_state(
        &status,
        assigned_to,
        occupied_at.map(parse_datetime),
        closed_at.map(parse_datetime),
        pr_url,
        pr_status.as_deref(),
    );

    Ok(Issue {
        id: parse_uuid(row.get::<_, String>(0)?),
        title: row.get(1)?,
        tags,
        repo: row.get(3)?,
        state,
        points_awarded: row.get::<_, i64>(10)? != 0,
        created_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

/// Assemble an [`IssueState`] from raw columns.
///
/// All writes go through [`IssueState`], so the columns normally always form
/// a valid state. A hand-edited row that does not (an occupied issue missing
/// its assignee or clock) is read back as open, with a warning; the domain
/// never sees an invalid combination.
fn decode_state(
    status: &str,
    assigned_to: Option<String>,
    occupied_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    pr_url: Option<String>,
    pr_status: Option<&str>,
) -> IssueState {
    match status {
        "occupied" => match (assigned_to, occupied_at) {
            (Some(assigned_to), Some(occupied_at)) => IssueState::Occupied {
                assigned_to,
                occupied_at,
            },
            _ => {
                tracing::warn!("Occupied issue row missing assignee or clock; reading as open");
                IssueState::Open
            }
        },
        "closed" => IssueState::Closed {
            assigned_to,
            occupied_at,
            closed_at,
            pr_url,
            pr_status: pr_status
                .and_then(PrStatus::from_str)
                .unwrap_or(PrStatus::Pending),
        },
        "open" => IssueState::Open,
        other => {
            tracing::warn!("Unknown issue status {other:?}; reading as open");
            IssueState::Open
        }
    }
}

/// Flatten an [`IssueState`] back into its columns.
fn state_columns(
    state: &IssueState,
) -> (
    &'static str,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
) {
    match state {
        IssueState::Open => ("open", None, None, None, None, None),
        IssueState::Occupied {
            assigned_to,
            occupied_at,
        } => (
            "occupied",
            Some(assigned_to.clone()),
            Some(occupied_at.to_rfc3339()),
            None,
            None,
            None,
        ),
        IssueState::Closed {
            assigned_to,
            occupied_at,
            closed_at,
            pr_url,
            pr_status,
        } => (
            "closed",
            assigned_to.clone(),
            occupied_at.map(|t| t.to_rfc3339()),
            closed_at.map(|t| t.to_rfc3339()),
            pr_url.clone(),
            Some(pr_status.as_str().to_string()),
        ),
    }
}

/// Write a new state, conditioned on the status the caller read. Returns the
/// affected row count: zero means the guard failed and the caller lost a
/// race.
fn apply_state(
    tx: &Transaction<'_>,
    id: Uuid,
    expected: IssueStatus,
    state: &IssueState,
    points_awarded: Option<bool>,
) -> Result<usize> {
    let (status, assigned_to, occupied_at, closed_at, pr_url, pr_status) = state_columns(state);
    let rows = match points_awarded {
        Some(marker) => tx.execute(
            "UPDATE issues SET status = ?, assigned_to = ?, occupied_at = ?, closed_at = ?,
                    pr_url = ?, pr_status = ?, points_awarded = ?
             WHERE id = ? AND status = ?",
            (
                status,
                assigned_to,
                occupied_at,
                closed_at,
                pr_url,
                pr_status,
                marker as i64,
                id.to_string(),
                expected.as_str(),
            ),
        )?,
        None => tx.execute(
            "UPDATE issues SET status = ?, assigned_to = ?, occupied_at = ?, closed_at = ?,
                    pr_url = ?, pr_status = ?
             WHERE id = ? AND status = ?",
            (
                status,
                assigned_to,
                occupied_at,
                closed_at,
                pr_url,
                pr_status,
                id.to_string(),
                expected.as_str(),
            ),
        )?,
    };
    Ok(rows)
}

/// Write a new state unconditionally. Admin overrides only.
fn apply_state_unconditional(tx: &Transaction<'_>, id: Uuid, state: &IssueState) -> Result<usize> {
    let (status, assigned_to, occupied_at, closed_at, pr_url, pr_status) = state_columns(state);
    let rows = tx.execute(
        "UPDATE issues SET status = ?, assigned_to = ?, occupied_at = ?, closed_at = ?,
                pr_url = ?, pr_status = ?
         WHERE id = ?",
        (
            status,
            assigned_to,
            occupied_at,
            closed_at,
            pr_url,
            pr_status,
            id.to_string(),
        ),
    )?;
    Ok(rows)
}

fn occupied_count(conn: &Connection, team: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM issues WHERE status = 'occupied' AND assigned_to = ?",
        [team],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn adjust_points_in(conn: &Connection, team: &str, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE teams SET points = MAX(0, points + ?) WHERE name = ?",
        (delta, team),
    )?;
    Ok(())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
