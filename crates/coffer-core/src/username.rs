//! Username normalization.

use crate::error::{LoginError, Result};

/// Normalize a username: trim, lowercase, and reject anything outside
/// printable ASCII. Every identity derivation and stash lookup goes
/// through this, so two spellings of the same name always land on the
/// same account.
pub fn fix_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(LoginError::InvalidUsername);
    }
    if !trimmed.chars().all(|c| (' '..='~').contains(&c)) {
        return Err(LoginError::InvalidUsername);
    }
    Ok(trimmed.to_ascii_lowercase())
}
