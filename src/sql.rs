use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::Config;

/*
DROP TABLE IF EXISTS borrow_log;
DROP TABLE IF EXISTS wrote;
DROP TABLE IF EXISTS books;
DROP TABLE IF EXISTS authors;
DROP TABLE IF EXISTS categories;
DROP TABLE IF EXISTS profiles;
DROP TABLE IF EXISTS accounts;
*/

pub const TABLE_SCHEMA: &[&str] = &[
	r#"
CREATE TABLE IF NOT EXISTS accounts (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	username TEXT NOT NULL UNIQUE,
	email TEXT NOT NULL DEFAULT '',
	pass_hash TEXT NOT NULL,
	is_staff BOOL NOT NULL DEFAULT false,
	joined TEXT NOT NULL
)"#,
	r#"
CREATE TABLE IF NOT EXISTS profiles (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	user_id INTEGER NOT NULL UNIQUE,
	penalty_point INTEGER NOT NULL DEFAULT 0,
	CHECK(penalty_point >= 0),
	FOREIGN KEY(user_id) REFERENCES accounts(id) ON DELETE CASCADE
)"#,
	r#"
CREATE TABLE IF NOT EXISTS categories (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	name TEXT NOT NULL
)"#,
	r#"
CREATE TABLE IF NOT EXISTS authors (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	name TEXT NOT NULL,
	bio TEXT NOT NULL DEFAULT ''
)"#,
	r#"
CREATE TABLE IF NOT EXISTS books (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	title TEXT NOT NULL,
	description TEXT NOT NULL DEFAULT '',
	category_id INTEGER NOT NULL,
	total_copies INTEGER NOT NULL,
	available_copies INTEGER NOT NULL,
	CHECK(available_copies >= 0 AND available_copies <= total_copies),
	FOREIGN KEY(category_id) REFERENCES categories(id) ON DELETE CASCADE
)"#,
	r#"
CREATE TABLE IF NOT EXISTS wrote (
	author_id INTEGER NOT NULL,
	book_id INTEGER NOT NULL,
	UNIQUE(author_id, book_id),
	FOREIGN KEY(author_id) REFERENCES authors(id) ON DELETE CASCADE,
	FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE
)"#,
	r#"
CREATE TABLE IF NOT EXISTS borrow_log (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	user_id INTEGER NOT NULL,
	book_id INTEGER NOT NULL,
	borrow_date TEXT NOT NULL,
	due_date TEXT NOT NULL,
	return_date TEXT DEFAULT NULL,
	CHECK(return_date IS NULL OR return_date >= borrow_date),
	FOREIGN KEY(user_id) REFERENCES accounts(id) ON DELETE CASCADE,
	FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE
)"#,
	"CREATE INDEX IF NOT EXISTS idx_borrow_log_open ON borrow_log(user_id, return_date)",
	"CREATE INDEX IF NOT EXISTS idx_books_category ON books(category_id)",
	"CREATE INDEX IF NOT EXISTS idx_wrote_book ON wrote(book_id)",
];

/// Opens the pool described by `config`. An in-memory database lives only as
/// long as its connection, so it is pinned to a single one that never idles out.
pub async fn connect(config: &Config) -> Result<Pool<Sqlite>, sqlx::Error> {
	// writers wait on each other instead of failing with SQLITE_BUSY
	let options = SqliteConnectOptions::from_str(&config.database_url)?
		.create_if_missing(true)
		.foreign_keys(true)
		.busy_timeout(Duration::from_secs(5));

	let (pool, options) = if config.database_url.contains(":memory:") {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None);
		(pool, options)
	} else {
		let pool = SqlitePoolOptions::new()
			.max_connections(config.max_connections)
			.acquire_timeout(Duration::from_secs(3));
		(pool, options.journal_mode(SqliteJournalMode::Wal))
	};

	pool.connect_with(options).await
}

pub async fn migrate(db: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
	for statement in TABLE_SCHEMA {
		sqlx::query(statement).execute(db).await?;
	}
	Ok(())
}
