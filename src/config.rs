// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Maximum number of AI hints a participant may request per question.
pub const MAX_HINTS_PER_QUESTION: i32 = 2;

/// Number of prior attempts kept on an answer and replayed into hint prompts.
pub const HINT_HISTORY_LIMIT: usize = 3;

/// Upper bound of an oracle score.
pub const MAX_SCORE: i32 = 10;

const DEFAULT_ORACLE_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_ORACLE_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_JWT_EXPIRATION_SECS: u64 = 86_400;

/// What happens when an already-correct answer is resubmitted and scores below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResubmissionPolicy {
    /// The latest submission always replaces the stored one.
    #[default]
    LastWriteWins,
    /// A correct answer is only replaced by an incorrect one when the caller asks to retry.
    KeepCorrect,
}

impl FromStr for ResubmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_write_wins" => Ok(Self::LastWriteWins),
            "keep_correct" => Ok(Self::KeepCorrect),
            other => Err(format!("unknown resubmission policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub oracle_api_key: String,
    pub oracle_base_url: String,
    pub oracle_model: String,
    pub oracle_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_hints: i32,
    pub resubmission_policy: ResubmissionPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let oracle_api_key = env::var("ORACLE_API_KEY").expect("ORACLE_API_KEY must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let resubmission_policy = env::var("RESUBMISSION_POLICY")
            .ok()
            .map(|raw| raw.parse::<ResubmissionPolicy>().expect("invalid RESUBMISSION_POLICY"))
            .unwrap_or_default();

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION_SECS),
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            oracle_api_key,
            oracle_base_url: env::var("ORACLE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ORACLE_BASE_URL.to_string()),
            oracle_model: env::var("ORACLE_MODEL")
                .unwrap_or_else(|_| DEFAULT_ORACLE_MODEL.to_string()),
            oracle_timeout_secs: parse_or("ORACLE_TIMEOUT_SECS", DEFAULT_ORACLE_TIMEOUT_SECS),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            max_hints: parse_or("MAX_HINTS", MAX_HINTS_PER_QUESTION),
            resubmission_policy,
        }
    }

    /// Oracle deadline, kept at least one second inside the request deadline
    /// so a slow oracle surfaces as an oracle timeout, not a dropped request.
    pub fn oracle_timeout(&self) -> Duration {
        let ceiling = self.request_timeout_secs.saturating_sub(1).max(1);
        Duration::from_secs(self.oracle_timeout_secs.min(ceiling))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
