// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Simulation profile: single-answer questions, placed first.
pub const SIMULATION_SINGLE_COUNT: usize = 50;
/// Simulation profile: multi-answer questions, placed after the single-answer block.
pub const SIMULATION_MULTIPLE_COUNT: usize = 150;
/// Simulation tests always run for 4 hours.
pub const SIMULATION_DURATION_SECONDS: i64 = 4 * 60 * 60;

/// Upper bound for a standard test.
pub const MAX_TEST_QUESTIONS: i32 = 500;

/// Question titles are derived from the prompt when not given.
pub const TITLE_MAX_CHARS: usize = 50;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// CSV import accepts at most `choice1..choice5`.
pub const CSV_MAX_CHOICES: usize = 5;
pub const CSV_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30 * 24 * 60 * 60);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("APP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let admin_username = env::var("ADMIN_USERNAME").ok().filter(|v| !v.is_empty());
        let admin_password = env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            admin_username,
            admin_password,
        }
    }
}
