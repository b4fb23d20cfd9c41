//! Fixtures shared by the in-crate tests.

use sqlx::{Pool, Sqlite};

use crate::accounts::{self, NewAccount};
use crate::auth::JwtKeys;
use crate::config::Config;
use crate::sql;
use crate::types::{Account, Aid, Bid, Cid};
use tempfile::TempDir;

pub fn config() -> Config {
	Config {
		database_url: "sqlite::memory:".to_string(),
		jwt_secret: "test-secret-key-for-testing".to_string(),
		bcrypt_cost: 4,
		..Config::default()
	}
}

pub fn keys() -> JwtKeys {
	JwtKeys::new(&config())
}

/// A migrated in-memory database.
pub async fn pool() -> Pool<Sqlite> {
	let db = sql::connect(&config()).await.unwrap();
	sql::migrate(&db).await.unwrap();
	db
}

/// A migrated database file with a multi-connection pool, so writers can
/// actually contend. The database lives as long as the returned directory.
pub async fn file_pool() -> (TempDir, Pool<Sqlite>) {
	let dir = tempfile::tempdir().unwrap();
	let config = Config {
		database_url: format!("sqlite://{}", dir.path().join("library.db").display()),
		max_connections: 8,
		..config()
	};
	let db = sql::connect(&config).await.unwrap();
	sql::migrate(&db).await.unwrap();
	(dir, db)
}

pub async fn account(db: &Pool<Sqlite>, username: &str, is_staff: bool) -> Account {
	accounts::create_account(
		db,
		NewAccount {
			username: username.to_string(),
			email: format!("{username}@test.com"),
			password: "password123".to_string(),
			is_staff,
		},
		4,
	)
	.await
	.unwrap()
}

pub async fn category(db: &Pool<Sqlite>, name: &str) -> Cid {
	sqlx::query("INSERT INTO categories (name) VALUES (?)")
		.bind(name)
		.execute(db)
		.await
		.unwrap()
		.last_insert_rowid()
}

pub async fn author(db: &Pool<Sqlite>, name: &str) -> Aid {
	sqlx::query("INSERT INTO authors (name, bio) VALUES (?, '')")
		.bind(name)
		.execute(db)
		.await
		.unwrap()
		.last_insert_rowid()
}

/// A book with `copies` total copies, all of them on the shelf.
pub async fn book(db: &Pool<Sqlite>, title: &str, category: Cid, authors: &[Aid], copies: i64) -> Bid {
	let id = sqlx::query(
		"INSERT INTO books (title, description, category_id, total_copies, available_copies) VALUES (?, '', ?, ?, ?)",
	)
	.bind(title)
	.bind(category)
	.bind(copies)
	.bind(copies)
	.execute(db)
	.await
	.unwrap()
	.last_insert_rowid();

	for author in authors {
		sqlx::query("INSERT INTO wrote (author_id, book_id) VALUES (?, ?)")
			.bind(author)
			.bind(id)
			.execute(db)
			.await
			.unwrap();
	}
	id
}

pub async fn available_copies(db: &Pool<Sqlite>, book: Bid) -> i64 {
	sqlx::query_scalar("SELECT available_copies FROM books WHERE id = ?")
		.bind(book)
		.fetch_one(db)
		.await
		.unwrap()
}

pub async fn open_loans(db: &Pool<Sqlite>, book: Bid) -> i64 {
	sqlx::query_scalar("SELECT COUNT(*) FROM borrow_log WHERE book_id = ? AND return_date IS NULL")
		.bind(book)
		.fetch_one(db)
		.await
		.unwrap()
}

pub async fn penalty(db: &Pool<Sqlite>, user: i64) -> i64 {
	sqlx::query_scalar("SELECT penalty_point FROM profiles WHERE user_id = ?")
		.bind(user)
		.fetch_one(db)
		.await
		.unwrap()
}
