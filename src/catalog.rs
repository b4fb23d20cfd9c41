//! Categories, authors and books.
//!
//! Reads are open to everyone; the handlers gate writes on staff privilege
//! before calling in here.

use sqlx::{Pool, Sqlite, Transaction};
use validator::Validate;

use crate::error::{self, AppError, AppResult, FieldErrors};
use crate::types::{
	Aid, Author, AuthorForm, AuthorPatch, Bid, Book, BookFilter, BookParams, BookPatch, BookQuery, Category,
	CategoryForm, CategoryPatch, Cid, NewBookForm,
};

const BOOK_COLUMNS: &str = "b.id, b.title, b.description, b.category_id, b.total_copies, b.available_copies";

// categories

pub async fn list_categories(db: &Pool<Sqlite>) -> AppResult<Vec<Category>> {
	let categories = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id")
		.fetch_all(db)
		.await?;
	Ok(categories)
}

pub async fn find_category(db: &Pool<Sqlite>, id: Cid) -> AppResult<Option<Category>> {
	let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
		.bind(id)
		.fetch_optional(db)
		.await?;
	Ok(category)
}

pub async fn create_category(db: &Pool<Sqlite>, form: CategoryForm) -> AppResult<Category> {
	form.validate()?;
	let id = sqlx::query("INSERT INTO categories (name) VALUES (?)")
		.bind(&form.name)
		.execute(db)
		.await?
		.last_insert_rowid();
	Ok(Category { id, name: form.name })
}

pub async fn update_category(db: &Pool<Sqlite>, id: Cid, patch: CategoryPatch) -> AppResult<Category> {
	patch.validate()?;
	let mut category = find_category(db, id).await?.ok_or(AppError::NotFound("category"))?;
	if let Some(name) = patch.name {
		category.name = name;
	}
	sqlx::query("UPDATE categories SET name = ? WHERE id = ?")
		.bind(&category.name)
		.bind(id)
		.execute(db)
		.await?;
	Ok(category)
}

/// Removes the category along with every book filed under it.
pub async fn delete_category(db: &Pool<Sqlite>, id: Cid) -> AppResult<()> {
	delete_row(db, "DELETE FROM categories WHERE id = ?", id, "category").await
}

// authors

pub async fn list_authors(db: &Pool<Sqlite>) -> AppResult<Vec<Author>> {
	let authors = sqlx::query_as::<_, Author>("SELECT id, name, bio FROM authors ORDER BY id")
		.fetch_all(db)
		.await?;
	Ok(authors)
}

pub async fn find_author(db: &Pool<Sqlite>, id: Aid) -> AppResult<Option<Author>> {
	let author = sqlx::query_as::<_, Author>("SELECT id, name, bio FROM authors WHERE id = ?")
		.bind(id)
		.fetch_optional(db)
		.await?;
	Ok(author)
}

pub async fn create_author(db: &Pool<Sqlite>, form: AuthorForm) -> AppResult<Author> {
	form.validate()?;
	let id = sqlx::query("INSERT INTO authors (name, bio) VALUES (?, ?)")
		.bind(&form.name)
		.bind(&form.bio)
		.execute(db)
		.await?
		.last_insert_rowid();
	Ok(Author { id, name: form.name, bio: form.bio })
}

pub async fn update_author(db: &Pool<Sqlite>, id: Aid, patch: AuthorPatch) -> AppResult<Author> {
	patch.validate()?;
	let mut author = find_author(db, id).await?.ok_or(AppError::NotFound("author"))?;
	if let Some(name) = patch.name {
		author.name = name;
	}
	if let Some(bio) = patch.bio {
		author.bio = bio;
	}
	sqlx::query("UPDATE authors SET name = ?, bio = ? WHERE id = ?")
		.bind(&author.name)
		.bind(&author.bio)
		.bind(id)
		.execute(db)
		.await?;
	Ok(author)
}

pub async fn delete_author(db: &Pool<Sqlite>, id: Aid) -> AppResult<()> {
	delete_row(db, "DELETE FROM authors WHERE id = ?", id, "author").await
}

// books

/// Empty query values are ignored; anything else must be an id.
pub fn parse_filter(params: &BookParams) -> AppResult<BookFilter> {
	fn id(field: &str, raw: &Option<String>) -> AppResult<Option<i64>> {
		match raw.as_deref().map(str::trim) {
			None | Some("") => Ok(None),
			Some(value) => value
				.parse()
				.map(Some)
				.map_err(|_| AppError::field(field, format!("\"{value}\" is not a valid id."))),
		}
	}

	Ok(BookFilter {
		author: id("author", &params.author)?,
		category: id("category", &params.category)?,
	})
}

/// Both filters must match when both are given.
pub async fn list_books(db: &Pool<Sqlite>, filter: BookFilter) -> AppResult<Vec<Book>> {
	let rows = sqlx::query_as::<_, BookQuery>(&format!(
		"SELECT {BOOK_COLUMNS} FROM books b
		WHERE (? IS NULL OR EXISTS (SELECT 1 FROM wrote w WHERE w.book_id = b.id AND w.author_id = ?))
		AND (? IS NULL OR b.category_id = ?)
		ORDER BY b.id"
	))
	.bind(filter.author)
	.bind(filter.author)
	.bind(filter.category)
	.bind(filter.category)
	.fetch_all(db)
	.await?;

	let mut books = Vec::with_capacity(rows.len());
	for row in rows {
		books.push(hydrate(db, row).await?);
	}
	Ok(books)
}

pub async fn find_book(db: &Pool<Sqlite>, id: Bid) -> AppResult<Option<Book>> {
	match find_book_row(db, id).await? {
		Some(row) => Ok(Some(hydrate(db, row).await?)),
		None => Ok(None),
	}
}

async fn find_book_row(db: &Pool<Sqlite>, id: Bid) -> AppResult<Option<BookQuery>> {
	let row = sqlx::query_as::<_, BookQuery>(&format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = ?"))
		.bind(id)
		.fetch_optional(db)
		.await?;
	Ok(row)
}

async fn hydrate(db: &Pool<Sqlite>, row: BookQuery) -> AppResult<Book> {
	let authors = sqlx::query_as::<_, Author>(
		"SELECT a.id, a.name, a.bio FROM authors a JOIN wrote w ON w.author_id = a.id WHERE w.book_id = ? ORDER BY a.id",
	)
	.bind(row.id)
	.fetch_all(db)
	.await?;

	// category_id is NOT NULL with a cascading foreign key
	let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
		.bind(row.category_id)
		.fetch_one(db)
		.await?;

	Ok(Book::from_query(row, authors, category))
}

pub async fn create_book(db: &Pool<Sqlite>, form: NewBookForm) -> AppResult<Book> {
	let mut errors = error::field_errors(&form);
	check_copies(form.total_copies, form.available_copies, &mut errors);
	check_category(db, form.category_id, &mut errors).await?;
	check_authors(db, &form.author_ids, &mut errors).await?;
	if !errors.is_empty() {
		return Err(AppError::Validation(errors));
	}

	let mut tx = db.begin().await?;
	let id = sqlx::query(
		"INSERT INTO books (title, description, category_id, total_copies, available_copies) VALUES (?, ?, ?, ?, ?)",
	)
	.bind(&form.title)
	.bind(&form.description)
	.bind(form.category_id)
	.bind(form.total_copies)
	.bind(form.available_copies)
	.execute(&mut *tx)
	.await?
	.last_insert_rowid();
	set_authors(&mut tx, id, &form.author_ids).await?;
	tx.commit().await?;

	tracing::info!(book = id, title = %form.title, "book added to catalog");
	find_book(db, id).await?.ok_or(AppError::NotFound("book"))
}

/// Partial update; `author_ids`, when present, replaces the whole author set.
pub async fn update_book(db: &Pool<Sqlite>, id: Bid, patch: BookPatch) -> AppResult<Book> {
	if find_book_row(db, id).await?.is_none() {
		return Err(AppError::NotFound("book"));
	}

	let mut errors = error::field_errors(&patch);
	if let (Some(total), Some(available)) = (patch.total_copies, patch.available_copies) {
		check_copies(total, available, &mut errors);
	}
	if let Some(category) = patch.category_id {
		check_category(db, category, &mut errors).await?;
	}
	if let Some(authors) = &patch.author_ids {
		check_authors(db, authors, &mut errors).await?;
	}
	if !errors.is_empty() {
		return Err(AppError::Validation(errors));
	}

	// Fields the patch leaves out keep their live values, so a borrow or
	// return committed since the check above is never written back over.
	let mut tx = db.begin().await?;
	let updated = sqlx::query(
		"UPDATE books SET
			title = COALESCE(?, title),
			description = COALESCE(?, description),
			category_id = COALESCE(?, category_id),
			total_copies = COALESCE(?, total_copies),
			available_copies = COALESCE(?, available_copies)
		WHERE id = ? AND COALESCE(?, available_copies) <= COALESCE(?, total_copies)",
	)
	.bind(patch.title)
	.bind(patch.description)
	.bind(patch.category_id)
	.bind(patch.total_copies)
	.bind(patch.available_copies)
	.bind(id)
	.bind(patch.available_copies)
	.bind(patch.total_copies)
	.execute(&mut *tx)
	.await?
	.rows_affected();

	if updated == 0 {
		let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = ?)")
			.bind(id)
			.fetch_one(&mut *tx)
			.await?;
		if !exists {
			return Err(AppError::NotFound("book"));
		}
		let mut errors = FieldErrors::new();
		copies_exceeded(&mut errors);
		return Err(AppError::Validation(errors));
	}

	if let Some(authors) = &patch.author_ids {
		set_authors(&mut tx, id, authors).await?;
	}
	tx.commit().await?;

	find_book(db, id).await?.ok_or(AppError::NotFound("book"))
}

/// Removes the book and its borrow history.
pub async fn delete_book(db: &Pool<Sqlite>, id: Bid) -> AppResult<()> {
	delete_row(db, "DELETE FROM books WHERE id = ?", id, "book").await
}

async fn set_authors(tx: &mut Transaction<'_, Sqlite>, book: Bid, authors: &[Aid]) -> AppResult<()> {
	sqlx::query("DELETE FROM wrote WHERE book_id = ?")
		.bind(book)
		.execute(&mut **tx)
		.await?;
	for author in authors {
		sqlx::query("INSERT OR IGNORE INTO wrote (author_id, book_id) VALUES (?, ?)")
			.bind(author)
			.bind(book)
			.execute(&mut **tx)
			.await?;
	}
	Ok(())
}

fn check_copies(total: i64, available: i64, errors: &mut FieldErrors) {
	if available > total {
		copies_exceeded(errors);
	}
}

fn copies_exceeded(errors: &mut FieldErrors) {
	errors
		.entry("available_copies".to_string())
		.or_default()
		.push("Ensure this value is less than or equal to total_copies.".to_string());
}

async fn check_category(db: &Pool<Sqlite>, id: Cid, errors: &mut FieldErrors) -> AppResult<()> {
	if find_category(db, id).await?.is_none() {
		errors
			.entry("category_id".to_string())
			.or_default()
			.push(format!("Invalid pk \"{id}\" - object does not exist."));
	}
	Ok(())
}

async fn check_authors(db: &Pool<Sqlite>, ids: &[Aid], errors: &mut FieldErrors) -> AppResult<()> {
	for &id in ids {
		if find_author(db, id).await?.is_none() {
			errors
				.entry("author_ids".to_string())
				.or_default()
				.push(format!("Invalid pk \"{id}\" - object does not exist."));
		}
	}
	Ok(())
}

async fn delete_row(db: &Pool<Sqlite>, statement: &str, id: i64, what: &'static str) -> AppResult<()> {
	let deleted = sqlx::query(statement).bind(id).execute(db).await?.rows_affected();
	if deleted == 0 {
		return Err(AppError::NotFound(what));
	}
	tracing::info!(id, what, "deleted");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils;

	fn new_book(title: &str, category: Cid, authors: Vec<Aid>, total: i64, available: i64) -> NewBookForm {
		NewBookForm {
			title: title.to_string(),
			description: String::new(),
			category_id: category,
			author_ids: authors,
			total_copies: total,
			available_copies: available,
		}
	}

	#[tokio::test]
	async fn filters_are_conjunctive() {
		let db = test_utils::pool().await;
		let fiction = test_utils::category(&db, "Fiction").await;
		let history = test_utils::category(&db, "History").await;
		let le_guin = test_utils::author(&db, "Ursula K. Le Guin").await;
		let tuchman = test_utils::author(&db, "Barbara Tuchman").await;

		let wanted = test_utils::book(&db, "The Dispossessed", fiction, &[le_guin], 2).await;
		test_utils::book(&db, "The Guns of August", history, &[tuchman], 1).await;
		test_utils::book(&db, "A Distant Mirror", history, &[tuchman], 1).await;
		test_utils::book(&db, "Co-written", history, &[le_guin, tuchman], 1).await;

		let both = list_books(&db, BookFilter { author: Some(le_guin), category: Some(fiction) })
			.await
			.unwrap();
		assert_eq!(both.iter().map(|b| b.id).collect::<Vec<_>>(), vec![wanted]);

		let by_author = list_books(&db, BookFilter { author: Some(le_guin), category: None }).await.unwrap();
		assert_eq!(by_author.len(), 2);

		let by_category = list_books(&db, BookFilter { author: None, category: Some(history) }).await.unwrap();
		assert_eq!(by_category.len(), 3);
		assert_eq!(list_books(&db, BookFilter::default()).await.unwrap().len(), 4);
	}

	#[test]
	fn blank_filters_are_ignored() {
		let filter = parse_filter(&BookParams { author: Some(String::new()), category: Some("5".to_string()) })
			.unwrap();
		assert_eq!(filter, BookFilter { author: None, category: Some(5) });

		assert!(parse_filter(&BookParams { author: Some("three".to_string()), category: None }).is_err());
	}

	#[tokio::test]
	async fn create_book_attaches_authors_and_category() {
		let db = test_utils::pool().await;
		let category = test_utils::category(&db, "Poetry").await;
		let author = test_utils::author(&db, "Mary Oliver").await;

		let book = create_book(&db, new_book("Devotions", category, vec![author], 3, 3)).await.unwrap();

		assert_eq!(book.category.name, "Poetry");
		assert_eq!(book.authors.len(), 1);
		assert_eq!(book.authors[0].name, "Mary Oliver");
		assert_eq!(book.available_copies, 3);
	}

	#[tokio::test]
	async fn create_book_rejects_unknown_references_and_excess_copies() {
		let db = test_utils::pool().await;

		let err = create_book(&db, new_book("Ghost", 99, vec![42], 1, 2)).await.unwrap_err();
		match err {
			AppError::Validation(errors) => {
				assert!(errors.contains_key("category_id"));
				assert!(errors.contains_key("author_ids"));
				assert!(errors.contains_key("available_copies"));
			}
			other => panic!("expected validation error, got {other:?}"),
		}

		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books").fetch_one(&db).await.unwrap();
		assert_eq!(count, 0);
	}

	#[tokio::test]
	async fn update_book_is_partial() {
		let db = test_utils::pool().await;
		let category = test_utils::category(&db, "Science").await;
		let first = test_utils::author(&db, "Carl Sagan").await;
		let second = test_utils::author(&db, "Ann Druyan").await;
		let id = test_utils::book(&db, "Cosmos", category, &[first], 4).await;

		let book = update_book(
			&db,
			id,
			BookPatch { description: Some("A personal voyage".to_string()), ..BookPatch::default() },
		)
		.await
		.unwrap();
		assert_eq!(book.title, "Cosmos");
		assert_eq!(book.description, "A personal voyage");
		assert_eq!(book.authors.len(), 1);

		let book = update_book(&db, id, BookPatch { author_ids: Some(vec![first, second]), ..BookPatch::default() })
			.await
			.unwrap();
		assert_eq!(book.authors.len(), 2);

		let shrink = update_book(&db, id, BookPatch { total_copies: Some(2), ..BookPatch::default() }).await;
		assert!(matches!(shrink, Err(AppError::Validation(_))), "4 available cannot exceed 2 total");

		let missing = update_book(&db, 999, BookPatch::default()).await;
		assert!(matches!(missing, Err(AppError::NotFound("book"))));
	}

	#[tokio::test]
	async fn update_book_keeps_live_copy_counts() {
		let db = test_utils::pool().await;
		let category = test_utils::category(&db, "History").await;
		let id = test_utils::book(&db, "SPQR", category, &[], 4).await;

		// a checkout lands after the book was last read
		sqlx::query("UPDATE books SET available_copies = available_copies - 1 WHERE id = ?")
			.bind(id)
			.execute(&db)
			.await
			.unwrap();

		let book = update_book(&db, id, BookPatch { title: Some("SPQR (2nd ed.)".to_string()), ..BookPatch::default() })
			.await
			.unwrap();
		assert_eq!((book.total_copies, book.available_copies), (4, 3));

		let over = update_book(&db, id, BookPatch { available_copies: Some(5), ..BookPatch::default() }).await;
		match over {
			Err(AppError::Validation(errors)) => assert!(errors.contains_key("available_copies")),
			other => panic!("expected a validation error, got {other:?}"),
		}
		assert_eq!(test_utils::available_copies(&db, id).await, 3);

		let book = update_book(&db, id, BookPatch { total_copies: Some(3), ..BookPatch::default() }).await.unwrap();
		assert_eq!((book.total_copies, book.available_copies), (3, 3));
	}

	#[tokio::test]
	async fn deleting_a_category_removes_its_books() {
		let db = test_utils::pool().await;
		let category = test_utils::category(&db, "Doomed").await;
		let id = test_utils::book(&db, "Ephemera", category, &[], 1).await;

		delete_category(&db, category).await.unwrap();

		assert!(find_book(&db, id).await.unwrap().is_none());
		assert!(matches!(delete_category(&db, category).await, Err(AppError::NotFound("category"))));
	}

	#[tokio::test]
	async fn author_crud() {
		let db = test_utils::pool().await;

		let author = create_author(&db, AuthorForm { name: "Octavia Butler".to_string(), bio: String::new() })
			.await
			.unwrap();
		let updated = update_author(
			&db,
			author.id,
			AuthorPatch { bio: Some("Parable novels".to_string()), ..AuthorPatch::default() },
		)
		.await
		.unwrap();
		assert_eq!(updated.name, "Octavia Butler");
		assert_eq!(updated.bio, "Parable novels");

		assert!(matches!(
			create_author(&db, AuthorForm { name: String::new(), bio: String::new() }).await,
			Err(AppError::Validation(_))
		));

		delete_author(&db, author.id).await.unwrap();
		assert!(list_authors(&db).await.unwrap().is_empty());
	}
}
