//! Bearer-token auth gate.
//!
//! Pure function of the incoming header and the secret configured at
//! startup; every protected endpoint runs it before touching any state.

use sha2::{Digest, Sha256};
use thiserror::Error;

const SCHEME: &str = "Bearer ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingCredential,
    #[error("invalid bearer token")]
    InvalidCredential,
}

pub fn authorize(header: Option<&str>, secret: &str) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    let token = header
        .strip_prefix(SCHEME)
        .ok_or(AuthError::MissingCredential)?
        .trim();
    if token_matches(token, secret) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredential)
    }
}

// compare digests instead of raw strings so the comparison cost does not
// depend on where the candidate diverges from the secret
fn token_matches(candidate: &str, secret: &str) -> bool {
    Sha256::digest(candidate.as_bytes()) == Sha256::digest(secret.as_bytes())
}
