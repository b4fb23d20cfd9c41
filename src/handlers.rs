use axum::{
	async_trait,
	extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
	http::request::Parts,
	http::StatusCode,
	routing::{get, post},
	Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower_cookies::{Cookie, Cookies};

use crate::auth::{self, AuthUser, ACCESS_COOKIE};
use crate::error::{AppError, AppResult};
use crate::types::*;
use crate::{accounts, catalog, ledger, pages, ServerState};

/// `Json` whose rejections come back as field errors under `body`.
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		match Json::<T>::from_request(req, state).await {
			Ok(Json(value)) => Ok(Payload(value)),
			Err(rejection) => Err(AppError::field("body", rejection.body_text())),
		}
	}
}

/// `Path` whose rejections come back as field errors under `path`.
pub struct PathId<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathId<T>
where
	T: DeserializeOwned + Send,
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		match Path::<T>::from_request_parts(parts, state).await {
			Ok(Path(value)) => Ok(PathId(value)),
			Err(rejection) => Err(AppError::field("path", rejection.body_text())),
		}
	}
}

/// `Query` whose rejections come back as field errors under `query`.
pub struct Params<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Params<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		match Query::<T>::from_request_parts(parts, state).await {
			Ok(Query(value)) => Ok(Params(value)),
			Err(rejection) => Err(AppError::field("query", rejection.body_text())),
		}
	}
}

pub fn routes() -> Router<ServerState> {
	Router::new()
		.route("/", get(pages::catalog))
		.route("/health", get(health))
		.route("/api/register/", post(register))
		.route("/api/login/", post(login))
		.route("/api/refresh/", post(refresh))
		.route("/api/books/", get(list_books).post(create_book))
		.route("/api/books/:id", get(get_book).put(update_book).delete(delete_book))
		.route("/api/authors/", get(list_authors).post(create_author))
		.route("/api/authors/:id/", get(get_author).put(update_author).delete(delete_author))
		.route("/api/categories/", get(list_categories).post(create_category))
		.route(
			"/api/categories/:id/",
			get(get_category).put(update_category).delete(delete_category),
		)
		.route("/api/borrow/", get(list_loans).post(borrow))
		.route("/api/return/", post(give_back))
		.route("/api/users/:id/penalties/", get(penalties))
}

async fn health() -> Json<Value> {
	Json(json!({
		"status": "healthy",
		"version": env!("CARGO_PKG_VERSION"),
	}))
}

// accounts

async fn register(
	State(state): State<ServerState>,
	Payload(form): Payload<FormRegister>,
) -> AppResult<(StatusCode, Json<Message>)> {
	accounts::register(&state.db, form, state.config.bcrypt_cost).await?;
	Ok((
		StatusCode::CREATED,
		Json(Message { message: "User registered successfully!".to_string() }),
	))
}

async fn login(
	State(state): State<ServerState>,
	cookies: Cookies,
	Payload(form): Payload<FormLogin>,
) -> AppResult<Json<TokenPair>> {
	let (account, pair) = accounts::login(&state.db, &state.keys, form).await?;

	cookies.add(
		Cookie::build((ACCESS_COOKIE, pair.access.clone()))
			.path("/")
			.http_only(true)
			.build(),
	);
	tracing::info!(user = account.id, "logged in");

	Ok(Json(pair))
}

async fn refresh(
	State(state): State<ServerState>,
	Payload(form): Payload<FormRefresh>,
) -> AppResult<Json<AccessToken>> {
	Ok(Json(accounts::refresh(&state.db, &state.keys, form).await?))
}

// books

async fn list_books(
	State(state): State<ServerState>,
	Params(params): Params<BookParams>,
) -> AppResult<Json<Vec<Book>>> {
	let filter = catalog::parse_filter(&params)?;
	Ok(Json(catalog::list_books(&state.db, filter).await?))
}

async fn get_book(State(state): State<ServerState>, PathId(id): PathId<Bid>) -> AppResult<Json<Book>> {
	let book = catalog::find_book(&state.db, id).await?.ok_or(AppError::NotFound("book"))?;
	Ok(Json(book))
}

async fn create_book(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	Payload(form): Payload<NewBookForm>,
) -> AppResult<(StatusCode, Json<Book>)> {
	auth::require_staff(&user)?;
	let book = catalog::create_book(&state.db, form).await?;
	Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Bid>,
	Payload(patch): Payload<BookPatch>,
) -> AppResult<Json<Book>> {
	auth::require_staff(&user)?;
	Ok(Json(catalog::update_book(&state.db, id, patch).await?))
}

async fn delete_book(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Bid>,
) -> AppResult<StatusCode> {
	auth::require_staff(&user)?;
	catalog::delete_book(&state.db, id).await?;
	Ok(StatusCode::NO_CONTENT)
}

// authors

async fn list_authors(State(state): State<ServerState>) -> AppResult<Json<Vec<Author>>> {
	Ok(Json(catalog::list_authors(&state.db).await?))
}

async fn get_author(State(state): State<ServerState>, PathId(id): PathId<Aid>) -> AppResult<Json<Author>> {
	let author = catalog::find_author(&state.db, id).await?.ok_or(AppError::NotFound("author"))?;
	Ok(Json(author))
}

async fn create_author(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	Payload(form): Payload<AuthorForm>,
) -> AppResult<(StatusCode, Json<Author>)> {
	auth::require_staff(&user)?;
	Ok((StatusCode::CREATED, Json(catalog::create_author(&state.db, form).await?)))
}

async fn update_author(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Aid>,
	Payload(patch): Payload<AuthorPatch>,
) -> AppResult<Json<Author>> {
	auth::require_staff(&user)?;
	Ok(Json(catalog::update_author(&state.db, id, patch).await?))
}

async fn delete_author(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Aid>,
) -> AppResult<StatusCode> {
	auth::require_staff(&user)?;
	catalog::delete_author(&state.db, id).await?;
	Ok(StatusCode::NO_CONTENT)
}

// categories

async fn list_categories(State(state): State<ServerState>) -> AppResult<Json<Vec<Category>>> {
	Ok(Json(catalog::list_categories(&state.db).await?))
}

async fn get_category(State(state): State<ServerState>, PathId(id): PathId<Cid>) -> AppResult<Json<Category>> {
	let category = catalog::find_category(&state.db, id)
		.await?
		.ok_or(AppError::NotFound("category"))?;
	Ok(Json(category))
}

async fn create_category(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	Payload(form): Payload<CategoryForm>,
) -> AppResult<(StatusCode, Json<Category>)> {
	auth::require_staff(&user)?;
	Ok((StatusCode::CREATED, Json(catalog::create_category(&state.db, form).await?)))
}

async fn update_category(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Cid>,
	Payload(patch): Payload<CategoryPatch>,
) -> AppResult<Json<Category>> {
	auth::require_staff(&user)?;
	Ok(Json(catalog::update_category(&state.db, id, patch).await?))
}

async fn delete_category(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Cid>,
) -> AppResult<StatusCode> {
	auth::require_staff(&user)?;
	catalog::delete_category(&state.db, id).await?;
	Ok(StatusCode::NO_CONTENT)
}

// lending

async fn list_loans(State(state): State<ServerState>, AuthUser(user): AuthUser) -> AppResult<Json<Vec<LoanView>>> {
	Ok(Json(ledger::active_loans(&state.db, &user).await?))
}

async fn borrow(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	Payload(form): Payload<BorrowForm>,
) -> AppResult<(StatusCode, Json<BorrowReceipt>)> {
	let today = Utc::now().date_naive();
	let loan = ledger::borrow_book(&state.db, user.id, form.book_id, today).await?;

	Ok((
		StatusCode::CREATED,
		Json(BorrowReceipt {
			message: format!("Book borrowed successfully. Due date: {}", loan.due_date),
			borrow_id: loan.id,
			due_date: loan.due_date,
		}),
	))
}

async fn give_back(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	Payload(form): Payload<ReturnForm>,
) -> AppResult<Json<ReturnReceipt>> {
	let today = Utc::now().date_naive();
	let returned = ledger::return_book(&state.db, user.id, form.borrow_id, today).await?;

	let message = if returned.late_days > 0 {
		format!(
			"Book returned {} day(s) late. {} penalty point(s) added.",
			returned.late_days, returned.late_days
		)
	} else {
		"Book returned successfully.".to_string()
	};

	Ok(Json(ReturnReceipt {
		message,
		late_days: returned.late_days,
		penalty_points_added: returned.late_days,
	}))
}

async fn penalties(
	State(state): State<ServerState>,
	AuthUser(user): AuthUser,
	PathId(id): PathId<Uid>,
) -> AppResult<Json<PenaltyView>> {
	Ok(Json(ledger::penalties(&state.db, &user, id).await?))
}
