// library system

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod pages;
pub mod sql;
pub mod types;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use axum::{extract::Request, Router};
use sqlx::{Pool, Sqlite};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use config::Config;
pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct ServerState {
	pub db: Pool<Sqlite>,
	pub keys: Arc<auth::JwtKeys>,
	pub config: Arc<Config>,
}

impl ServerState {
	pub fn new(db: Pool<Sqlite>, config: Config) -> Self {
		ServerState {
			db,
			keys: Arc::new(auth::JwtKeys::new(&config)),
			config: Arc::new(config),
		}
	}
}

pub fn app(state: ServerState) -> Router {
	handlers::routes()
		.layer(CookieManagerLayer::new())
		.layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
			tracing::info_span!(
				"request",
				request_id = %Uuid::new_v4(),
				method = %request.method(),
				uri = %request.uri(),
			)
		}))
		.with_state(state)
}
