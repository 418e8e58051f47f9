//! Static competition configuration.
//!
//! The event runs with a fixed roster: team credentials, the admin account,
//! and the starter repositories are compiled-in constants. This is not an
//! adversarial-security setup and is not meant to be one; credentials exist
//! to keep teams out of each other's sessions, nothing more.

use std::time::Duration;

/// A team allowed to participate, with its shared login password.
#[derive(Debug, Clone, Copy)]
pub struct TeamCredential {
    pub name: &'static str,
    pub password: &'static str,
}

/// The fixed team allow-list. Teams outside this list cannot log in.
pub const ALLOWED_TEAMS: &[TeamCredential] = &[
    TeamCredential {
        name: "TeamAlpha",
        password: "alpha-2025",
    },
    TeamCredential {
        name: "TeamBravo",
        password: "bravo-2025",
    },
    TeamCredential {
        name: "TeamCharlie",
        password: "charlie-2025",
    },
    TeamCredential {
        name: "TeamDelta",
        password: "delta-2025",
    },
];

pub const ADMIN_USERNAME: &str = "dvadmin";
pub const ADMIN_PASSWORD: &str = "2025";

/// Opaque bearer value handed out by a successful admin login and expected
/// by the admin API routes. Static, like every other credential here.
pub const ADMIN_TOKEN: &str = "arena-admin-f3a91c07";

/// Repositories seeded on first run: (name, url).
pub const INITIAL_REPOSITORIES: &[(&str, &str)] = &[
    ("awesome-repo", "https://github.com/example/awesome-repo"),
    ("ui-kit", "https://github.com/example/ui-kit"),
    ("lib-helpers", "https://github.com/example/lib-helpers"),
];

/// Issues seeded on first run: (title, tag, repo).
pub const INITIAL_ISSUES: &[(&str, &str, &str)] = &[
    ("Fix navigation bug", "easy", "awesome-repo"),
    ("Implement dark mode", "medium", "ui-kit"),
    ("Optimize performance", "hard", "lib-helpers"),
    ("Add unit tests", "medium", "awesome-repo"),
    ("Update documentation", "easy", "ui-kit"),
];

/// How often the expiry sweeper re-checks occupied issues.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Look up a team's credentials in the allow-list.
pub fn find_team(name: &str) -> Option<&'static TeamCredential> {
    ALLOWED_TEAMS.iter().find(|t| t.name == name)
}
