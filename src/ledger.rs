//! The borrow ledger: checkout, return and late-return penalties.
//!
//! Every operation runs in one transaction whose first statement is a
//! conditional write. That takes SQLite's write lock before anything is
//! read, so racing requests queue on the busy timeout and then see each
//! other's commits: only one can take the last copy or close a loan.

use chrono::{Duration, NaiveDate};
use sqlx::{Pool, Sqlite};

use crate::accounts;
use crate::auth;
use crate::catalog;
use crate::error::{AppError, AppResult};
use crate::types::{Account, Bid, Borrow, BorrowStatus, LoanView, Lid, PenaltyView, Uid, UserView};

/// Open loans a single user may hold at once.
pub const LOAN_LIMIT: i64 = 3;
pub const LOAN_DAYS: i64 = 14;

const BORROW_COLUMNS: &str = "id, user_id, book_id, borrow_date, due_date, return_date";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Returned {
	pub borrow: Borrow,
	/// Days past the due date; this is also the number of penalty points added.
	pub late_days: i64,
}

pub async fn borrow_book(db: &Pool<Sqlite>, user: Uid, book: Bid, today: NaiveDate) -> AppResult<Borrow> {
	let mut tx = db.begin().await?;

	let taken = sqlx::query("UPDATE books SET available_copies = available_copies - 1 WHERE id = ? AND available_copies > 0")
		.bind(book)
		.execute(&mut *tx)
		.await?
		.rows_affected()
		== 1;

	if !taken {
		let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = ?)")
			.bind(book)
			.fetch_one(&mut *tx)
			.await?;
		if !exists {
			return Err(AppError::NotFound("book"));
		}
	}
	// an early return drops `tx`, which rolls the decrement back
	if active_count(&mut tx, user).await? >= LOAN_LIMIT {
		tracing::debug!(user, book, "borrow limit reached");
		return Err(AppError::BorrowLimitReached);
	}
	if !taken {
		tracing::debug!(user, book, "no copies available");
		return Err(AppError::NoCopiesAvailable);
	}

	let due_date = today + Duration::days(LOAN_DAYS);
	let id = sqlx::query("INSERT INTO borrow_log (user_id, book_id, borrow_date, due_date) VALUES (?, ?, ?, ?)")
		.bind(user)
		.bind(book)
		.bind(today)
		.bind(due_date)
		.execute(&mut *tx)
		.await?
		.last_insert_rowid();

	tx.commit().await?;

	tracing::info!(user, book, borrow = id, %due_date, "book borrowed");

	Ok(Borrow {
		id,
		user_id: user,
		book_id: book,
		borrow_date: today,
		due_date,
		return_date: None,
	})
}

pub async fn return_book(db: &Pool<Sqlite>, user: Uid, borrow: Lid, today: NaiveDate) -> AppResult<Returned> {
	let mut tx = db.begin().await?;

	// the ledger never records a return before its checkout
	let closed = sqlx::query_as::<_, Borrow>(&format!(
		"UPDATE borrow_log SET return_date = MAX(?, borrow_date)
		WHERE id = ? AND user_id = ? AND return_date IS NULL
		RETURNING {BORROW_COLUMNS}"
	))
	.bind(today)
	.bind(borrow)
	.bind(user)
	.fetch_optional(&mut *tx)
	.await?;

	let loan = match closed {
		Some(loan) => loan,
		None => {
			let loan = sqlx::query_as::<_, Borrow>(&format!(
				"SELECT {BORROW_COLUMNS} FROM borrow_log WHERE id = ? AND user_id = ?"
			))
			.bind(borrow)
			.bind(user)
			.fetch_optional(&mut *tx)
			.await?;
			return Err(match loan {
				Some(loan) if loan.status() == BorrowStatus::Returned => AppError::AlreadyReturned,
				_ => AppError::NotFound("borrow record"),
			});
		}
	};
	let return_date = loan.return_date.unwrap_or(today);

	sqlx::query("UPDATE books SET available_copies = MIN(available_copies + 1, total_copies) WHERE id = ?")
		.bind(loan.book_id)
		.execute(&mut *tx)
		.await?;

	let late_days = (return_date - loan.due_date).num_days().max(0);
	if late_days > 0 {
		sqlx::query("UPDATE profiles SET penalty_point = penalty_point + ? WHERE user_id = ?")
			.bind(late_days)
			.bind(user)
			.execute(&mut *tx)
			.await?;
	}

	tx.commit().await?;

	tracing::info!(user, borrow = loan.id, book = loan.book_id, late_days, "book returned");

	Ok(Returned { borrow: loan, late_days })
}

async fn active_count(tx: &mut sqlx::Transaction<'_, Sqlite>, user: Uid) -> AppResult<i64> {
	let count = sqlx::query_scalar("SELECT COUNT(*) FROM borrow_log WHERE user_id = ? AND return_date IS NULL")
		.bind(user)
		.fetch_one(&mut **tx)
		.await?;
	Ok(count)
}

pub async fn active_loans(db: &Pool<Sqlite>, user: &Account) -> AppResult<Vec<LoanView>> {
	let rows = sqlx::query_as::<_, Borrow>(&format!(
		"SELECT {BORROW_COLUMNS} FROM borrow_log WHERE user_id = ? AND return_date IS NULL ORDER BY id"
	))
	.bind(user.id)
	.fetch_all(db)
	.await?;

	let mut loans = Vec::with_capacity(rows.len());
	for row in rows {
		let book = catalog::find_book(db, row.book_id)
			.await?
			.ok_or(AppError::NotFound("book"))?;
		loans.push(LoanView {
			id: row.id,
			user: UserView::from(user),
			book,
			borrow_date: row.borrow_date,
			due_date: row.due_date,
			return_date: row.return_date,
		});
	}
	Ok(loans)
}

/// Self or staff only; the privilege check comes before the lookup so that
/// strangers cannot probe which ids exist.
pub async fn penalties(db: &Pool<Sqlite>, caller: &Account, target: Uid) -> AppResult<PenaltyView> {
	if !auth::can_view_penalties(caller, target) {
		return Err(AppError::Forbidden("you may only view your own penalties"));
	}

	let account = accounts::find_by_id(db, target).await?.ok_or(AppError::NotFound("user"))?;
	let profile = accounts::profile_of(db, target).await?.ok_or(AppError::NotFound("profile"))?;

	Ok(PenaltyView {
		username: account.username,
		penalty_points: profile.penalty_point,
	})
}
