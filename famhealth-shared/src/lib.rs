//! # FamHealth Shared Library
//!
//! Types, queries and domain logic used by the FamHealth API server.
//!
//! ## Module Organization
//!
//! - `auth`: JWT issuing and validation, password hashing, bearer middleware
//! - `db`: connection pool and embedded migrations
//! - `models`: database rows and their queries
//! - `domain`: reference ranges, vaccine schedules, checkup status, advice parsing

pub mod auth;
pub mod db;
pub mod domain;
pub mod models;

/// Current version of the FamHealth shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
