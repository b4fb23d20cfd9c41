use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub type Uid = i64;
pub type Bid = i64;
pub type Aid = i64;
pub type Cid = i64;
pub type Lid = i64;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
	pub id: Uid,
	pub username: String,
	pub email: String,
	pub pass_hash: String,
	pub is_staff: bool,
	pub joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
	pub id: Uid,
	pub username: String,
	pub email: String,
}

impl From<&Account> for UserView {
	fn from(account: &Account) -> Self {
		UserView {
			id: account.id,
			username: account.username.clone(),
			email: account.email.clone(),
		}
	}
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct Profile {
	pub id: i64,
	pub user_id: Uid,
	pub penalty_point: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Category {
	pub id: Cid,
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Author {
	pub id: Aid,
	pub name: String,
	pub bio: String,
}

/// A `books` row before its authors and category are attached.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookQuery {
	pub id: Bid,
	pub title: String,
	pub description: String,
	pub category_id: Cid,
	pub total_copies: i64,
	pub available_copies: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Book {
	pub id: Bid,
	pub title: String,
	pub description: String,
	pub total_copies: i64,
	pub available_copies: i64,
	pub authors: Vec<Author>,
	pub category: Category,
}

impl Book {
	pub fn from_query(info: BookQuery, authors: Vec<Author>, category: Category) -> Self {
		Book {
			id: info.id,
			title: info.title,
			description: info.description,
			total_copies: info.total_copies,
			available_copies: info.available_copies,
			authors,
			category,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
	Active,
	Returned,
}

impl BorrowStatus {
	pub fn from(return_date: Option<NaiveDate>) -> Self {
		match return_date {
			Some(_) => BorrowStatus::Returned,
			None => BorrowStatus::Active,
		}
	}
}

/// One row of the borrow ledger.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Borrow {
	pub id: Lid,
	pub user_id: Uid,
	pub book_id: Bid,
	pub borrow_date: NaiveDate,
	pub due_date: NaiveDate,
	pub return_date: Option<NaiveDate>,
}

impl Borrow {
	pub fn status(&self) -> BorrowStatus {
		BorrowStatus::from(self.return_date)
	}
}

#[derive(Debug, Serialize)]
pub struct LoanView {
	pub id: Lid,
	pub user: UserView,
	pub book: Book,
	pub borrow_date: NaiveDate,
	pub due_date: NaiveDate,
	pub return_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PenaltyView {
	pub username: String,
	pub penalty_points: i64,
}

#[derive(Debug, Serialize)]
pub struct Message {
	pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BorrowReceipt {
	pub message: String,
	pub borrow_id: Lid,
	pub due_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct ReturnReceipt {
	pub message: String,
	pub late_days: i64,
	pub penalty_points_added: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
	pub access: String,
	pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
	pub access: String,
}

#[derive(Deserialize, Debug, Validate)]
pub struct FormRegister {
	#[validate(length(min = 1, max = 150, message = "Ensure this field has between 1 and 150 characters."))]
	pub username: String,
	#[serde(default)]
	#[validate(email(message = "Enter a valid email address."))]
	pub email: Option<String>,
	#[validate(length(min = 8, message = "Ensure this field has at least 8 characters."))]
	pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct FormLogin {
	pub username: String,
	pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct FormRefresh {
	pub refresh: String,
}

#[derive(Deserialize, Debug)]
pub struct BorrowForm {
	pub book_id: Bid,
}

#[derive(Deserialize, Debug)]
pub struct ReturnForm {
	pub borrow_id: Lid,
}

#[derive(Deserialize, Debug, Validate)]
pub struct CategoryForm {
	#[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
	pub name: String,
}

#[derive(Deserialize, Debug, Default, Validate)]
pub struct CategoryPatch {
	#[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
	pub name: Option<String>,
}

#[derive(Deserialize, Debug, Validate)]
pub struct AuthorForm {
	#[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
	pub name: String,
	#[serde(default)]
	pub bio: String,
}

#[derive(Deserialize, Debug, Default, Validate)]
pub struct AuthorPatch {
	#[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
	pub name: Option<String>,
	pub bio: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Validate)]
pub struct NewBookForm {
	#[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
	pub title: String,
	#[serde(default)]
	pub description: String,
	pub category_id: Cid,
	#[serde(default)]
	pub author_ids: Vec<Aid>,
	#[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
	pub total_copies: i64,
	#[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
	pub available_copies: i64,
}

#[derive(Deserialize, Debug, Clone, Default, Validate)]
pub struct BookPatch {
	#[validate(length(min = 1, max = 100, message = "Ensure this field has between 1 and 100 characters."))]
	pub title: Option<String>,
	pub description: Option<String>,
	pub category_id: Option<Cid>,
	pub author_ids: Option<Vec<Aid>>,
	#[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
	pub total_copies: Option<i64>,
	#[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
	pub available_copies: Option<i64>,
}

/// Raw `?author=&category=` query; empty values mean "no filter".
#[derive(Deserialize, Debug, Default)]
pub struct BookParams {
	pub author: Option<String>,
	pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookFilter {
	pub author: Option<Aid>,
	pub category: Option<Cid>,
}
