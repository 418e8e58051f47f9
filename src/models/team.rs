use serde::{Deserialize, Serialize};

/// A competing team.
///
/// Teams are seeded from the fixed allow-list at first run and never deleted.
/// `points` is mutated by three independent actors (merge awards, ad-hoc
/// admin awards, expiry penalties) and is clamped at zero on every mutation
/// path, so it can never go negative regardless of interleaving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub points: i64,
    /// True while a session is open for this team. At most one session may
    /// be open per team; the flag is the whole session model.
    pub active: bool,
}
