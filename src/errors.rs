//! Failure taxonomy for commands.
//!
//! Every user-visible failure is a [`CommandError`] variant with a short
//! message the presentation layer can surface verbatim. Command failures are
//! normal outcomes (a lost occupy race is expected, not exceptional) and are
//! always recoverable by retrying with different input or after observing
//! updated state. Store faults are kept separate so handlers can sanitise
//! them instead of leaking internals.

use thiserror::Error;

/// A precondition or credential failure for a single command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Team not recognized. Contact admin.")]
    UnknownTeam,

    #[error("Invalid team credentials.")]
    BadCredentials,

    #[error("This team is already active. Only one active session allowed.")]
    AlreadyActive,

    #[error("This team has no active session. Log in first.")]
    SessionNotActive,

    #[error("Issue was already claimed by another team.")]
    AlreadyOccupied,

    #[error("A team may hold at most {max} occupied issues.")]
    QuotaExceeded { max: usize },

    #[error("Issue is assigned to a different team.")]
    NotOwner,

    #[error("Issue is not in a state that allows this action.")]
    InvalidState,

    #[error("Pull request URL is not valid. Expected https://<host>/<owner>/<repo>/pull/<number>.")]
    InvalidPrUrl,

    #[error("{0} not found.")]
    NotFound(&'static str),
}

/// Facade-level failure: either a typed command failure or a store fault.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Store unavailable: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Store(e.into())
    }
}

impl AppError {
    /// The typed command failure, if this is one.
    pub fn command(&self) -> Option<&CommandError> {
        match self {
            AppError::Command(e) => Some(e),
            AppError::Store(_) => None,
        }
    }
}
