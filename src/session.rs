//! Session and authorization guard.
//!
//! A team's session is nothing more than client-held identity plus the
//! `active` flag on its store record: no tokens, no expiry, no renewal.
//! The one-session-per-team invariant is enforced with a conditional write
//! (`active = true only if currently false`), so two racing logins cannot
//! both succeed. Abandoned sessions are cleaned up by the start-up reset of
//! every `active` flag.
//!
//! Admin login is a static credential pair that yields a fixed bearer value
//! for the HTTP surface and an [`AdminToken`] capability in process.

use crate::config;
use crate::errors::{AppError, CommandError};
use crate::models::Team;
use crate::store::Store;

/// Proof of admin authorization. Only obtainable through [`login_admin`] or
/// [`verify_admin`], so facade methods taking one cannot be called from an
/// unauthorised path.
#[derive(Debug, Clone, Copy)]
pub struct AdminToken(());

/// Open a session for an allow-listed team.
pub fn login_team(store: &Store, name: &str, password: &str) -> Result<Team, AppError> {
    let cred = config::find_team(name).ok_or(CommandError::UnknownTeam)?;
    if password != cred.password {
        return Err(CommandError::BadCredentials.into());
    }
    if !store.try_activate(name)? {
        return Err(CommandError::AlreadyActive.into());
    }
    store
        .get_team(name)?
        .ok_or_else(|| CommandError::NotFound("Team").into())
}

/// Close a team's session. Idempotent; logging out an inactive or unknown
/// team is a no-op.
pub fn logout_team(store: &Store, name: &str) -> Result<(), AppError> {
    store.deactivate(name)?;
    Ok(())
}

/// Check that a team is allow-listed and currently holds a session. Team
/// commands go through this before touching any issue.
pub fn require_active(store: &Store, name: &str) -> Result<(), AppError> {
    if config::find_team(name).is_none() {
        return Err(CommandError::UnknownTeam.into());
    }
    match store.get_team(name)? {
        Some(team) if team.active => Ok(()),
        Some(_) => Err(CommandError::SessionNotActive.into()),
        None => Err(CommandError::NotFound("Team").into()),
    }
}

/// Validate the admin credential pair. Success yields the static bearer
/// value the HTTP surface expects on admin routes.
pub fn login_admin(username: &str, password: &str) -> Result<&'static str, AppError> {
    if username == config::ADMIN_USERNAME && password == config::ADMIN_PASSWORD {
        Ok(config::ADMIN_TOKEN)
    } else {
        Err(CommandError::BadCredentials.into())
    }
}

/// Exchange a bearer value for the admin capability.
pub fn verify_admin(bearer: &str) -> Option<AdminToken> {
    if bearer == config::ADMIN_TOKEN {
        Some(AdminToken(()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_login_checks_both_fields() {
        assert!(login_admin(config::ADMIN_USERNAME, config::ADMIN_PASSWORD).is_ok());
        assert!(login_admin(config::ADMIN_USERNAME, "wrong").is_err());
        assert!(login_admin("root", config::ADMIN_PASSWORD).is_err());
    }

    #[test]
    fn verify_admin_accepts_only_the_static_token() {
        assert!(verify_admin(config::ADMIN_TOKEN).is_some());
        assert!(verify_admin("").is_none());
        assert!(verify_admin("arena-admin-guess").is_none());
    }
}
