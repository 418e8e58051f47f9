//! The issue lifecycle state machine.
//!
//! Pure transition logic over model values: no storage, no clocks, no IO.
//! Callers pass `now` explicitly and apply the returned state themselves,
//! which keeps every rule in one place and makes the whole machine testable
//! without a database.
//!
//! Normal edges are `open -> occupied -> closed`; the expiry sweep is the
//! one non-admin path back from `occupied` to `open`. Admin overrides are
//! the `force_*` constructors at the bottom: rather than poking individual
//! fields they build the nearest valid state, so an override can never leave
//! an issue in a combination the domain cannot represent.

mod pr_url;

use chrono::{DateTime, Utc};

use crate::errors::CommandError;
use crate::models::{Issue, IssueState, IssueStatus, PrStatus, ReviewDecision};

pub use pr_url::is_valid_pr_url;

/// Hard cap on concurrently occupied issues per team.
pub const MAX_OCCUPIED_PER_TEAM: usize = 3;

/// A team claims an open issue, starting its countdown.
///
/// `held_count` is the number of issues the team already occupies; callers
/// must compute it in the same transaction that applies the result, or the
/// quota check is racy.
pub fn occupy(
    issue: &Issue,
    team: &str,
    held_count: usize,
    now: DateTime<Utc>,
) -> Result<IssueState, CommandError> {
    if !matches!(issue.state, IssueState::Open) {
        // Expected outcome of a lost race, not a fault.
        return Err(CommandError::AlreadyOccupied);
    }
    if held_count >= MAX_OCCUPIED_PER_TEAM {
        return Err(CommandError::QuotaExceeded {
            max: MAX_OCCUPIED_PER_TEAM,
        });
    }
    Ok(IssueState::Occupied {
        assigned_to: team.to_string(),
        occupied_at: now,
    })
}

/// The occupying team submits a pull request and closes the issue.
///
/// No points move here; the merge decision is the sole reward trigger.
pub fn close(
    issue: &Issue,
    team: &str,
    pr_url: &str,
    now: DateTime<Utc>,
) -> Result<IssueState, CommandError> {
    let IssueState::Occupied {
        assigned_to,
        occupied_at,
    } = &issue.state
    else {
        return Err(CommandError::InvalidState);
    };
    if assigned_to != team {
        return Err(CommandError::NotOwner);
    }
    if !is_valid_pr_url(pr_url) {
        return Err(CommandError::InvalidPrUrl);
    }
    Ok(IssueState::Closed {
        assigned_to: Some(assigned_to.clone()),
        occupied_at: Some(*occupied_at),
        closed_at: Some(now),
        pr_url: Some(pr_url.to_string()),
        pr_status: PrStatus::Pending,
    })
}

/// Outcome of an admin review decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub state: IssueState,
    /// Points to credit, and to whom. `None` for approve/reject, for merges
    /// of issues whose reward was already paid, for unassigned issues, and
    /// for issues whose first tag is not a difficulty.
    pub award: Option<(String, i64)>,
}

/// Admin decides on a closed issue's pull request.
///
/// Re-reviewing a non-pending PR is allowed (it is an admin surface), but
/// the merge reward is paid at most once per issue: callers must persist
/// `points_awarded` together with the new state.
pub fn review(issue: &Issue, decision: ReviewDecision) -> Result<Review, CommandError> {
    let IssueState::Closed {
        assigned_to,
        occupied_at,
        closed_at,
        pr_url,
        ..
    } = &issue.state
    else {
        return Err(CommandError::InvalidState);
    };

    let pr_status = match decision {
        ReviewDecision::Approve => PrStatus::Approved,
        ReviewDecision::Reject => PrStatus::Rejected,
        ReviewDecision::Merge => PrStatus::Merged,
    };
    let state = IssueState::Closed {
        assigned_to: assigned_to.clone(),
        occupied_at: *occupied_at,
        closed_at: *closed_at,
        pr_url: pr_url.clone(),
        pr_status,
    };

    let award = match decision {
        ReviewDecision::Merge if !issue.points_awarded => assigned_to.as_ref().and_then(|team| {
            issue
                .difficulty()
                .map(|d| (team.clone(), d.reward()))
        }),
        _ => None,
    };

    Ok(Review { state, award })
}

/// A deadline breach detected by the sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub team: String,
    pub penalty: i64,
    /// The `occupied_at` the decision was based on; the store conditions its
    /// reset on this value so a re-occupied issue is never reset by a stale
    /// sweep.
    pub occupied_at: DateTime<Utc>,
}

/// The moment an occupied issue becomes overdue, if it has a deadline.
pub fn expiry_deadline(issue: &Issue) -> Option<DateTime<Utc>> {
    let IssueState::Occupied { occupied_at, .. } = issue.state else {
        return None;
    };
    issue.difficulty().map(|d| occupied_at + d.deadline())
}

/// Check whether an issue is overdue. `None` for anything not occupied, not
/// yet overdue, or without a difficulty as its first tag; this is what makes
/// redundant sweeps no-ops.
pub fn expire(issue: &Issue, now: DateTime<Utc>) -> Option<Expiry> {
    let IssueState::Occupied {
        assigned_to,
        occupied_at,
    } = &issue.state
    else {
        return None;
    };
    let difficulty = issue.difficulty()?;
    if now - *occupied_at < difficulty.deadline() {
        return None;
    }
    Some(Expiry {
        team: assigned_to.clone(),
        penalty: difficulty.penalty(),
        occupied_at: *occupied_at,
    })
}

/// Apply a point delta with the floor-at-zero clamp.
///
/// The clamp applies uniformly to every mutation path: merge awards, ad-hoc
/// awards and expiry penalties alike.
pub fn clamped_points(points: i64, delta: i64) -> i64 {
    (points + delta).max(0)
}

/// Admin override: re-assign (or un-assign) an issue.
///
/// An escape hatch, not a normal edge. It constructs the nearest valid
/// state instead of force-writing a single field: un-assigning an occupied
/// issue reopens it, assigning an open issue occupies it from `now`.
pub fn force_assign(issue: &Issue, team: Option<&str>, now: DateTime<Utc>) -> IssueState {
    match (&issue.state, team) {
        (IssueState::Open, None) => IssueState::Open,
        (IssueState::Open, Some(team)) => IssueState::Occupied {
            assigned_to: team.to_string(),
            occupied_at: now,
        },
        (IssueState::Occupied { .. }, None) => IssueState::Open,
        (IssueState::Occupied { occupied_at, .. }, Some(team)) => IssueState::Occupied {
            assigned_to: team.to_string(),
            occupied_at: *occupied_at,
        },
        (
            IssueState::Closed {
                occupied_at,
                closed_at,
                pr_url,
                pr_status,
                ..
            },
            team,
        ) => IssueState::Closed {
            assigned_to: team.map(str::to_string),
            occupied_at: *occupied_at,
            closed_at: *closed_at,
            pr_url: pr_url.clone(),
            pr_status: *pr_status,
        },
    }
}

/// Admin override: force an issue into a target status.
///
/// Carries over what it can from the current state. Moving to `occupied`
/// needs an assignee to carry; without one there is nothing valid to build
/// and the override is rejected.
pub fn force_status(
    issue: &Issue,
    target: IssueStatus,
    now: DateTime<Utc>,
) -> Result<IssueState, CommandError> {
    match target {
        IssueStatus::Open => Ok(IssueState::Open),
        IssueStatus::Occupied => match issue.assigned_to() {
            Some(team) => Ok(IssueState::Occupied {
                assigned_to: team.to_string(),
                occupied_at: match issue.state {
                    IssueState::Occupied { occupied_at, .. } => occupied_at,
                    _ => now,
                },
            }),
            None => Err(CommandError::InvalidState),
        },
        IssueStatus::Closed => match &issue.state {
            IssueState::Closed { .. } => Ok(issue.state.clone()),
            _ => Ok(IssueState::Closed {
                assigned_to: issue.assigned_to().map(str::to_string),
                occupied_at: match issue.state {
                    IssueState::Occupied { occupied_at, .. } => Some(occupied_at),
                    _ => None,
                },
                closed_at: Some(now),
                pr_url: None,
                pr_status: PrStatus::Pending,
            }),
        },
    }
}
