use serde::{Deserialize, Serialize};

/// A sample repository that issues are filed against.
///
/// Static reference data: seeded at first run, occasionally added or removed
/// by the admin, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

/// Input for registering a new repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepositoryInput {
    pub name: String,
    pub url: String,
}
