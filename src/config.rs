use crate::engine::MatchWindows;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub reconcile_users: Vec<String>,
    pub deposit_window_ms: i64,
    pub withdrawal_window_ms: i64,
    pub off_ramp_window_ms: i64,
    pub candidate_fetch_cap: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let reconcile_users = env_map
            .get("RECONCILE_USERS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let deposit_window_ms = parse_i64(&env_map, "DEPOSIT_WINDOW_MS", 3_600_000)?;
        let withdrawal_window_ms = parse_i64(&env_map, "WITHDRAWAL_WINDOW_MS", 7_200_000)?;
        let off_ramp_window_ms = parse_i64(&env_map, "OFF_RAMP_WINDOW_MS", 86_400_000)?;

        let candidate_fetch_cap = env_map
            .get("CANDIDATE_FETCH_CAP")
            .map(|s| s.as_str())
            .unwrap_or("500")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CANDIDATE_FETCH_CAP".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;

        Ok(Config {
            database_path,
            reconcile_users,
            deposit_window_ms,
            withdrawal_window_ms,
            off_ramp_window_ms,
            candidate_fetch_cap,
        })
    }

    pub fn match_windows(&self) -> MatchWindows {
        MatchWindows {
            deposit_ms: self.deposit_window_ms,
            withdrawal_ms: self.withdrawal_window_ms,
        }
    }
}

fn parse_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(s) => s.parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid i64".to_string())
        }),
    }
}
