use axum::{
	async_trait,
	extract::FromRequestParts,
	http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::accounts;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::types::{Account, TokenPair, Uid};
use crate::ServerState;

pub const ACCESS_COOKIE: &str = "access_token";

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
	Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
	Ok(bcrypt::verify(password, hash)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
	Access,
	Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
	pub sub: Uid,
	pub username: String,
	pub kind: TokenKind,
	pub jti: Uuid,
	pub iat: i64,
	pub exp: i64,
}

pub struct JwtKeys {
	encoding: EncodingKey,
	decoding: DecodingKey,
	access_ttl: Duration,
	refresh_ttl: Duration,
}

impl JwtKeys {
	pub fn new(config: &Config) -> Self {
		JwtKeys {
			encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
			decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
			access_ttl: Duration::minutes(config.access_token_minutes),
			refresh_ttl: Duration::hours(config.refresh_token_hours),
		}
	}

	pub fn issue(&self, account: &Account, kind: TokenKind) -> AppResult<String> {
		let now = Utc::now();
		let ttl = match kind {
			TokenKind::Access => self.access_ttl,
			TokenKind::Refresh => self.refresh_ttl,
		};
		let claims = Claims {
			sub: account.id,
			username: account.username.clone(),
			kind,
			jti: Uuid::new_v4(),
			iat: now.timestamp(),
			exp: (now + ttl).timestamp(),
		};

		encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AppError::Token)
	}

	pub fn issue_pair(&self, account: &Account) -> AppResult<TokenPair> {
		Ok(TokenPair {
			access: self.issue(account, TokenKind::Access)?,
			refresh: self.issue(account, TokenKind::Refresh)?,
		})
	}

	/// Checks signature and expiry, then that the token is of the `expected` kind.
	pub fn verify(&self, token: &str, expected: TokenKind) -> AppResult<Claims> {
		let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
			.map_err(|e| {
				tracing::debug!(error = %e, "rejected token");
				AppError::Unauthenticated("invalid or expired token")
			})?;

		if data.claims.kind != expected {
			return Err(AppError::Unauthenticated("wrong token type"));
		}
		Ok(data.claims)
	}
}

/// Staff privilege gates every catalog mutation.
pub fn require_staff(user: &Account) -> AppResult<()> {
	if user.is_staff {
		Ok(())
	} else {
		Err(AppError::Forbidden("staff privilege required"))
	}
}

pub fn can_view_penalties(caller: &Account, target: Uid) -> bool {
	caller.is_staff || caller.id == target
}

/// The account behind the request's access token, re-read from the store.
pub struct AuthUser(pub Account);

#[async_trait]
impl FromRequestParts<ServerState> for AuthUser {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &ServerState) -> Result<Self, Self::Rejection> {
		let token = bearer_token(parts)
			.or_else(|| cookie_token(parts))
			.ok_or(AppError::Unauthenticated("missing credentials"))?;

		let claims = state.keys.verify(&token, TokenKind::Access)?;

		let account = accounts::find_by_id(&state.db, claims.sub)
			.await?
			.ok_or(AppError::Unauthenticated("account no longer exists"))?;

		Ok(AuthUser(account))
	}
}

fn bearer_token(parts: &Parts) -> Option<String> {
	let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
	header.strip_prefix("Bearer ").map(|token| token.trim().to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
	let cookies = parts.extensions.get::<Cookies>()?;
	cookies.get(ACCESS_COOKIE).map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn account(id: Uid, is_staff: bool) -> Account {
		Account {
			id,
			username: format!("user{id}"),
			email: String::new(),
			pass_hash: String::new(),
			is_staff,
			joined: Utc::now(),
		}
	}

	fn keys() -> JwtKeys {
		JwtKeys::new(&Config {
			jwt_secret: "test-secret-key-for-testing".to_string(),
			..Config::default()
		})
	}

	#[test]
	fn access_token_round_trips() {
		let keys = keys();
		let token = keys.issue(&account(7, false), TokenKind::Access).unwrap();

		let claims = keys.verify(&token, TokenKind::Access).unwrap();
		assert_eq!(claims.sub, 7);
		assert_eq!(claims.username, "user7");
	}

	#[test]
	fn refresh_token_is_not_an_access_token() {
		let keys = keys();
		let pair = keys.issue_pair(&account(7, false)).unwrap();

		assert!(matches!(
			keys.verify(&pair.refresh, TokenKind::Access),
			Err(AppError::Unauthenticated(_))
		));
		assert!(keys.verify(&pair.refresh, TokenKind::Refresh).is_ok());
	}

	#[test]
	fn token_signed_with_other_secret_is_rejected() {
		let other = JwtKeys::new(&Config {
			jwt_secret: "another-secret".to_string(),
			..Config::default()
		});
		let token = other.issue(&account(1, true), TokenKind::Access).unwrap();

		assert!(keys().verify(&token, TokenKind::Access).is_err());
		assert!(keys().verify("invalid.token.here", TokenKind::Access).is_err());
	}

	#[test]
	fn penalties_visible_to_self_and_staff_only() {
		assert!(can_view_penalties(&account(1, false), 1));
		assert!(!can_view_penalties(&account(1, false), 2));
		assert!(can_view_penalties(&account(3, true), 2));
	}

	#[test]
	fn staff_gate() {
		assert!(require_staff(&account(1, true)).is_ok());
		assert!(matches!(require_staff(&account(1, false)), Err(AppError::Forbidden(_))));
	}

	#[test]
	fn password_hash_verifies() {
		let hash = hash_password("correct horse", 4).unwrap();
		assert!(verify_password("correct horse", &hash).unwrap());
		assert!(!verify_password("battery staple", &hash).unwrap());
	}
}
