#![warn(missing_docs)]
//! # openid-login-contract-tests
//!
//! Locates the frozen JSON contracts shared with host applications. The
//! validation itself lives in this crate's `tests/` directory.

use std::path::PathBuf;

/// Returns the workspace `contracts/` directory.
pub fn contracts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("contracts")
}

/// Returns the path of a contract file relative to `contracts/`.
pub fn contract_path(relative: &str) -> PathBuf {
    contracts_dir().join(relative)
}
