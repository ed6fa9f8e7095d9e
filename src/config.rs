use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_SETTLE_DELAY_MS: u64 = 50;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_FETCH_CONCURRENCY: usize = 1;
const DEFAULT_CACHE_DIR: &str = ".boardsync";

/// Runtime settings for the sync engine and the offline cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Debounce applied before the initial load and before every cards phase.
    pub settle_delay: Duration,
    /// Upper bound on every single backend request.
    pub request_timeout: Duration,
    /// How many per-column card fetches may be in flight at once. `1` is sequential.
    pub fetch_concurrency: usize,
    /// Directory holding the file-backed offline cache.
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let fetch_concurrency: usize =
            parse_var("BOARD_FETCH_CONCURRENCY", DEFAULT_FETCH_CONCURRENCY)?;
        if fetch_concurrency == 0 {
            return Err(AppError::ConfigError(
                "BOARD_FETCH_CONCURRENCY must be at least 1".into(),
            ));
        }

        Ok(Self {
            settle_delay: Duration::from_millis(parse_var(
                "BOARD_SETTLE_DELAY_MS",
                DEFAULT_SETTLE_DELAY_MS,
            )?),
            request_timeout: Duration::from_millis(parse_var(
                "BOARD_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?),
            fetch_concurrency,
            cache_dir: env::var("BOARD_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR)),
        })
    }

    /// Settings suited to tests and in-process demos: no debounce.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("{} must be a number, got {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
