//! Password hashing. bcrypt does all the work; these are thin wrappers that
//! fold its errors into [`Error`].

use crate::error::Error;

pub use bcrypt::DEFAULT_COST;

pub fn hash_password(password: &str) -> Result<String, Error> {
    hash_password_with_cost(password, DEFAULT_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, Error> {
    Ok(bcrypt::hash(password, cost)?)
}

/// `false` for a wrong password and for a hash bcrypt cannot parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
