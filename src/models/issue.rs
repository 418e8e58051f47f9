use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work teams compete over.
///
/// The lifecycle lives entirely in [`IssueState`]: an issue is `open`,
/// `occupied` by exactly one team with a running countdown, or `closed` with
/// a submitted pull request awaiting admin review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    /// Free-form tags; the first tag drives every deadline/reward/penalty
    /// lookup, the rest are labels.
    pub tags: Vec<String>,
    pub repo: String,
    #[serde(flatten)]
    pub state: IssueState,
    /// Set once the merge reward has been paid out, so repeated merge
    /// decisions never double-pay.
    #[serde(default)]
    pub points_awarded: bool,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    /// The difficulty named by the first tag. An issue whose first tag is
    /// not a difficulty never expires and awards nothing on merge, even if a
    /// later tag happens to spell one.
    pub fn difficulty(&self) -> Option<Difficulty> {
        self.tags.first().and_then(|t| Difficulty::from_str(t))
    }

    pub fn status(&self) -> IssueStatus {
        match self.state {
            IssueState::Open => IssueStatus::Open,
            IssueState::Occupied { .. } => IssueStatus::Occupied,
            IssueState::Closed { .. } => IssueStatus::Closed,
        }
    }

    pub fn assigned_to(&self) -> Option<&str> {
        match &self.state {
            IssueState::Open => None,
            IssueState::Occupied { assigned_to, .. } => Some(assigned_to),
            IssueState::Closed { assigned_to, .. } => assigned_to.as_deref(),
        }
    }
}

/// The lifecycle of an issue as a tagged state.
///
/// `Closed` keeps `occupied_at` for history and treats `closed_at`/`pr_url`
/// as soft invariants: a normal team close always sets them, but an admin
/// forcing an issue closed produces a `Closed` state without a submission,
/// which the admin surface flags rather than auto-corrects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Occupied {
        assigned_to: String,
        occupied_at: DateTime<Utc>,
    },
    Closed {
        assigned_to: Option<String>,
        occupied_at: Option<DateTime<Utc>>,
        closed_at: Option<DateTime<Utc>>,
        pr_url: Option<String>,
        pr_status: PrStatus,
    },
}

/// The plain status discriminant, used for SQL columns and admin overrides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Occupied,
    Closed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Occupied => "occupied",
            Self::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "occupied" => Some(Self::Occupied),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Review status of a submitted pull request. Meaningful only while the
/// issue is closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    Pending,
    Approved,
    Merged,
    Rejected,
}

impl PrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Merged => "merged",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "merged" => Some(Self::Merged),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Issue difficulty, derived from tags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    /// How long a team may hold an occupied issue before the sweeper
    /// reclaims it.
    pub fn deadline(&self) -> Duration {
        match self {
            Self::Easy => Duration::minutes(20),
            Self::Medium => Duration::minutes(40),
            Self::Hard => Duration::minutes(60),
        }
    }

    /// Points awarded to the assignee when the admin merges the PR.
    pub fn reward(&self) -> i64 {
        match self {
            Self::Easy => 10,
            Self::Medium => 20,
            Self::Hard => 30,
        }
    }

    /// Points deducted from the assignee when the deadline is breached.
    pub fn penalty(&self) -> i64 {
        match self {
            Self::Easy => 5,
            Self::Medium => 10,
            Self::Hard => 15,
        }
    }
}

/// Input for creating a new issue. Issues always start open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIssueInput {
    pub title: String,
    pub tags: Vec<String>,
    pub repo: String,
}

/// An admin decision on a closed issue's pull request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Merge,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(state: IssueState, tags: &[&str]) -> Issue {
        Issue {
            id: Uuid::new_v4(),
            title: "Sample".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            repo: "awesome-repo".to_string(),
            state,
            points_awarded: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn difficulty_comes_from_the_first_tag_only() {
        let issue = sample(IssueState::Open, &["hard", "easy"]);
        assert_eq!(issue.difficulty(), Some(Difficulty::Hard));

        // A difficulty buried behind a label tag does not count.
        let labelled = sample(IssueState::Open, &["frontend", "hard"]);
        assert_eq!(labelled.difficulty(), None);

        let untagged = sample(IssueState::Open, &[]);
        assert_eq!(untagged.difficulty(), None);
    }

    #[test]
    fn state_serialises_with_flat_status_tag() {
        let issue = sample(
            IssueState::Occupied {
                assigned_to: "TeamAlpha".to_string(),
                occupied_at: Utc::now(),
            },
            &["easy"],
        );
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["status"], "occupied");
        assert_eq!(json["assigned_to"], "TeamAlpha");

        let back: Issue = serde_json::from_value(json).unwrap();
        assert_eq!(back.state, issue.state);
    }

    #[test]
    fn status_strings_round_trip_and_reject_garbage() {
        for status in [
            PrStatus::Pending,
            PrStatus::Approved,
            PrStatus::Merged,
            PrStatus::Rejected,
        ] {
            assert_eq!(PrStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PrStatus::from_str("abandoned"), None);
        assert_eq!(IssueStatus::from_str("reopened"), None);
    }

    #[test]
    fn difficulty_tables_match_the_rulebook() {
        assert_eq!(Difficulty::Easy.deadline(), Duration::minutes(20));
        assert_eq!(Difficulty::Medium.reward(), 20);
        assert_eq!(Difficulty::Hard.penalty(), 15);
    }
}
