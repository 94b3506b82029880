// Password digests are bcrypt strings ("$2b$<cost>$<salt+hash>").

use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};

pub fn hash_password(raw: &str) -> Result<String, BcryptError> {
    hash_with_cost(raw, DEFAULT_COST)
}

fn hash_with_cost(raw: &str, cost: u32) -> Result<String, BcryptError> {
    hash(raw, cost)
}

/// A stored value that is not a bcrypt digest never verifies.
pub fn verify_password(raw: &str, stored: &str) -> bool {
    match verify(raw, stored) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Stored password hash could not be checked: {}", e);
            false
        }
    }
}
