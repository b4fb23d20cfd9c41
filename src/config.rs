use std::str::FromStr;

use thiserror::Error;

const DEV_SECRET: &str = "insecure-development-secret";

#[derive(Debug, Clone)]
pub struct Config {
	pub database_url: String,
	pub bind_addr: String,
	pub max_connections: u32,
	pub jwt_secret: String,
	pub access_token_minutes: i64,
	pub refresh_token_hours: i64,
	pub bcrypt_cost: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("{key} is not a valid number: {value:?}")]
	Invalid { key: &'static str, value: String },
	#[error("JWT_SECRET must be set in release builds")]
	MissingSecret,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			database_url: "sqlite:library.db".to_string(),
			bind_addr: "0.0.0.0:8080".to_string(),
			max_connections: 5,
			jwt_secret: DEV_SECRET.to_string(),
			access_token_minutes: 5,
			refresh_token_hours: 24,
			bcrypt_cost: bcrypt::DEFAULT_COST,
		}
	}
}

impl Config {
	/// Reads the process environment, after loading `.env` if there is one.
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let defaults = Config::default();

		let jwt_secret = match lookup("JWT_SECRET") {
			Some(secret) if !secret.is_empty() => secret,
			_ if cfg!(debug_assertions) => {
				tracing::warn!("JWT_SECRET not set, using the development secret");
				defaults.jwt_secret
			}
			_ => return Err(ConfigError::MissingSecret),
		};

		Ok(Config {
			database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
			bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
			max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
			jwt_secret,
			access_token_minutes: parse(&lookup, "ACCESS_TOKEN_MINUTES", defaults.access_token_minutes)?,
			refresh_token_hours: parse(&lookup, "REFRESH_TOKEN_HOURS", defaults.refresh_token_hours)?,
			bcrypt_cost: parse(&lookup, "BCRYPT_COST", defaults.bcrypt_cost)?,
		})
	}
}

fn parse<T: FromStr>(
	lookup: &impl Fn(&str) -> Option<String>,
	key: &'static str,
	default: T,
) -> Result<T, ConfigError> {
	match lookup(key) {
		None => Ok(default),
		Some(value) => value
			.trim()
			.parse()
			.map_err(|_| ConfigError::Invalid { key, value }),
	}
}
