use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::auth::{self, JwtKeys, TokenKind};
use crate::error::{self, AppError, AppResult};
use crate::types::{AccessToken, Account, FormLogin, FormRefresh, FormRegister, Profile, TokenPair, Uid};

const ACCOUNT_COLUMNS: &str = "id, username, email, pass_hash, is_staff, joined";

pub struct NewAccount {
	pub username: String,
	pub email: String,
	pub password: String,
	pub is_staff: bool,
}

/// Inserts the account and its profile in one transaction.
pub async fn create_account(db: &Pool<Sqlite>, new: NewAccount, cost: u32) -> AppResult<Account> {
	let pass_hash = auth::hash_password(&new.password, cost)?;
	let joined = Utc::now();

	let mut tx = db.begin().await?;

	let inserted = sqlx::query(
		"INSERT INTO accounts (username, email, pass_hash, is_staff, joined) VALUES (?, ?, ?, ?, ?)",
	)
	.bind(&new.username)
	.bind(&new.email)
	.bind(&pass_hash)
	.bind(new.is_staff)
	.bind(joined)
	.execute(&mut *tx)
	.await;

	let id = match inserted {
		Ok(done) => done.last_insert_rowid(),
		Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
			return Err(username_taken());
		}
		Err(e) => return Err(e.into()),
	};

	sqlx::query("INSERT INTO profiles (user_id, penalty_point) VALUES (?, 0)")
		.bind(id)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	tracing::info!(user = id, username = %new.username, staff = new.is_staff, "account created");

	Ok(Account {
		id,
		username: new.username,
		email: new.email,
		pass_hash,
		is_staff: new.is_staff,
		joined,
	})
}

pub async fn register(db: &Pool<Sqlite>, mut form: FormRegister, cost: u32) -> AppResult<Account> {
	if form.email.as_deref().is_some_and(|email| email.trim().is_empty()) {
		form.email = None;
	}

	let mut errors = error::field_errors(&form);
	if errors.is_empty() && find_by_username(db, &form.username).await?.is_some() {
		errors.insert("username".to_string(), vec![TAKEN.to_string()]);
	}
	if !errors.is_empty() {
		return Err(AppError::Validation(errors));
	}

	create_account(
		db,
		NewAccount {
			username: form.username,
			email: form.email.unwrap_or_default(),
			password: form.password,
			is_staff: false,
		},
		cost,
	)
	.await
}

const TAKEN: &str = "A user with that username already exists.";

fn username_taken() -> AppError {
	AppError::field("username", TAKEN)
}

pub async fn find_by_id(db: &Pool<Sqlite>, id: Uid) -> AppResult<Option<Account>> {
	let account = sqlx::query_as::<_, Account>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
		.bind(id)
		.fetch_optional(db)
		.await?;
	Ok(account)
}

pub async fn find_by_username(db: &Pool<Sqlite>, username: &str) -> AppResult<Option<Account>> {
	let account =
		sqlx::query_as::<_, Account>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?"))
			.bind(username)
			.fetch_optional(db)
			.await?;
	Ok(account)
}

pub async fn profile_of(db: &Pool<Sqlite>, user: Uid) -> AppResult<Option<Profile>> {
	let profile = sqlx::query_as::<_, Profile>("SELECT id, user_id, penalty_point FROM profiles WHERE user_id = ?")
		.bind(user)
		.fetch_optional(db)
		.await?;
	Ok(profile)
}

pub async fn login(db: &Pool<Sqlite>, keys: &JwtKeys, form: FormLogin) -> AppResult<(Account, TokenPair)> {
	let account = find_by_username(db, &form.username)
		.await?
		.ok_or(AppError::Unauthenticated("no active account found with the given credentials"))?;

	if !auth::verify_password(&form.password, &account.pass_hash)? {
		tracing::debug!(username = %form.username, "password mismatch");
		return Err(AppError::Unauthenticated("no active account found with the given credentials"));
	}

	let pair = keys.issue_pair(&account)?;
	Ok((account, pair))
}

pub async fn refresh(db: &Pool<Sqlite>, keys: &JwtKeys, form: FormRefresh) -> AppResult<AccessToken> {
	let claims = keys.verify(&form.refresh, TokenKind::Refresh)?;
	let account = find_by_id(db, claims.sub)
		.await?
		.ok_or(AppError::Unauthenticated("account no longer exists"))?;

	Ok(AccessToken { access: keys.issue(&account, TokenKind::Access)? })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils;

	fn form(username: &str, email: Option<&str>, password: &str) -> FormRegister {
		FormRegister {
			username: username.to_string(),
			email: email.map(str::to_string),
			password: password.to_string(),
		}
	}

	#[tokio::test]
	async fn register_creates_profile_with_zero_penalty() {
		let db = test_utils::pool().await;

		let account = register(&db, form("alice", Some("alice@example.com"), "password123"), 4)
			.await
			.unwrap();

		let profile = profile_of(&db, account.id).await.unwrap().unwrap();
		assert_eq!(profile.penalty_point, 0);
		assert!(!account.is_staff);

		let profiles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
			.fetch_one(&db)
			.await
			.unwrap();
		assert_eq!(profiles, 1);
	}

	#[tokio::test]
	async fn duplicate_username_is_a_field_error() {
		let db = test_utils::pool().await;
		register(&db, form("alice", None, "password123"), 4).await.unwrap();

		let err = register(&db, form("alice", None, "password456"), 4).await.unwrap_err();
		match err {
			AppError::Validation(errors) => assert!(errors.contains_key("username")),
			other => panic!("expected validation error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn register_reports_every_bad_field() {
		let db = test_utils::pool().await;

		let err = register(&db, form("", Some("not-an-email"), "short"), 4).await.unwrap_err();
		match err {
			AppError::Validation(errors) => {
				assert!(errors.contains_key("username"));
				assert!(errors.contains_key("email"));
				assert!(errors.contains_key("password"));
			}
			other => panic!("expected validation error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn blank_email_is_accepted() {
		let db = test_utils::pool().await;
		let account = register(&db, form("bob", Some(""), "password123"), 4).await.unwrap();
		assert_eq!(account.email, "");
	}

	#[tokio::test]
	async fn login_and_refresh() {
		let db = test_utils::pool().await;
		let keys = test_utils::keys();
		register(&db, form("carol", None, "password123"), 4).await.unwrap();

		let bad = login(
			&db,
			&keys,
			FormLogin { username: "carol".to_string(), password: "wrong-password".to_string() },
		)
		.await;
		assert!(matches!(bad, Err(AppError::Unauthenticated(_))));

		let (account, pair) = login(
			&db,
			&keys,
			FormLogin { username: "carol".to_string(), password: "password123".to_string() },
		)
		.await
		.unwrap();

		let fresh = refresh(&db, &keys, FormRefresh { refresh: pair.refresh }).await.unwrap();
		let claims = keys.verify(&fresh.access, TokenKind::Access).unwrap();
		assert_eq!(claims.sub, account.id);

		let wrong_kind = refresh(&db, &keys, FormRefresh { refresh: pair.access }).await;
		assert!(matches!(wrong_kind, Err(AppError::Unauthenticated(_))));
	}
}
