//! Environment-driven configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `APP_ADDR` | `0.0.0.0:3000` |
//! | `APP_BASE_PATH` | none |
//! | `DB_PATH` | `callie.db` |
//! | `JWT_SECRET` | `change-this-secret-in-production` |
//! | `JWT_TTL` | `86400` |
//! | `RATE_LIMIT` | `100` |
//! | `RATE_LIMIT_WINDOW` | `60` |
//! | `CACHE_DIR` | `cache` |

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::Error;
use crate::security::{DEFAULT_LIMIT, DEFAULT_WINDOW_SECS};

const DEFAULT_SECRET: &str = "change-this-secret-in-production";

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub base_path: Option<String>,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub rate_limit: u64,
    pub rate_limit_window_secs: u64,
    pub cache_dir: PathBuf,
}

impl Config {
    /// Loads `.env` from the working directory if there is one, then reads the
    /// process environment. Variables already set win over `.env` entries.
    pub fn from_env() -> Result<Self, Error> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(e.to_string())),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET is not set, using the insecure default");
            DEFAULT_SECRET.to_owned()
        });

        Ok(Self {
            addr: get("APP_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_owned()),
            base_path: get("APP_BASE_PATH"),
            database_path: get("DB_PATH").map_or_else(|| "callie.db".into(), PathBuf::from),
            jwt_secret,
            token_ttl_secs: parse(&get, "JWT_TTL", 86_400)?,
            rate_limit: parse(&get, "RATE_LIMIT", DEFAULT_LIMIT)?,
            rate_limit_window_secs: parse(&get, "RATE_LIMIT_WINDOW", DEFAULT_WINDOW_SECS)?,
            cache_dir: get("CACHE_DIR").map_or_else(|| "cache".into(), PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, Error> {
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| Error::Config(format!("{key}={raw:?} is not a valid number"))),
        None => Ok(default),
    }
}
