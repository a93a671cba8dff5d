//! Stateless authentication and request throttling.
//!
//! - [`TokenCodec`]: HS256 compact tokens and `Authorization: Bearer` checks
//! - [`RateLimiter`]: fixed-window counting per client
//! - [`hash_password`] / [`verify_password`]: bcrypt
//! - [`sanitize`]: HTML-escaping of nested JSON values

mod password;
mod rate_limit;
mod sanitize;
mod token;

use std::time::{SystemTime, UNIX_EPOCH};

pub use password::{DEFAULT_COST, hash_password, hash_password_with_cost, verify_password};
pub use rate_limit::{
    DEFAULT_LIMIT, DEFAULT_WINDOW_SECS, FileStore, MemoryStore, RateLimiter, RateWindow,
    WindowStore,
};
pub use sanitize::{escape_html, sanitize};
pub use token::{Claims, INVALID_TOKEN, TokenCodec, UNAUTHORIZED};

/// Seconds since the unix epoch; `0` if the system clock is before it.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
