use std::time::Duration;
use std::{env, net::SocketAddr};

use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: SocketAddr,
    pub reply_endpoint: Option<String>,
    pub database_url: Option<String>,
    pub default_language: String,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_owned());
        let http_bind = env::var("HTTP_BIND").unwrap_or_else(|_| format!("0.0.0.0:{port}"));
        let http_bind = http_bind.parse()?;

        let rate_limit = RateLimitConfig {
            max_attempts: env_u32("CHAT_MAX_ATTEMPTS", 3),
            window: Duration::from_millis(env_u64("CHAT_WINDOW_MS", 60_000)),
            cooldown: Duration::from_millis(env_u64("CHAT_COOLDOWN_MS", 300_000)),
        };
        rate_limit.validate()?;

        Ok(Self {
            http_bind,
            reply_endpoint: env::var("REPLY_ENDPOINT").ok(),
            database_url: env::var("DATABASE_URL").ok(),
            default_language: env::var("CHAT_DEFAULT_LANGUAGE").unwrap_or_else(|_| "en".to_owned()),
            rate_limit,
        })
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
