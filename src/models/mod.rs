//! Domain models for CodeArena.
//!
//! # Core Concepts
//!
//! - [`Team`]: a competing team with a running score and a single-session
//!   `active` flag.
//! - [`Repository`]: static reference data; every issue points at one.
//! - [`Issue`]: the unit of competition. Its lifecycle is the tagged
//!   [`IssueState`] so illegal field combinations (an occupied issue with no
//!   assignee, an open issue with a countdown clock) cannot be represented
//!   in the domain at all.

mod issue;
mod repository;
mod team;

pub use issue::*;
pub use repository::*;
pub use team::*;
