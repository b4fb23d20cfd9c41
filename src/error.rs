use std::collections::BTreeMap;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde_json::json;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Field name to the list of problems found with it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum AppError {
	#[error("invalid input: {0:?}")]
	Validation(FieldErrors),

	#[error("{0} not found")]
	NotFound(&'static str),

	#[error("Borrow limit reached. Return a book before borrowing another.")]
	BorrowLimitReached,

	#[error("No copies of this book are available.")]
	NoCopiesAvailable,

	#[error("This book has already been returned.")]
	AlreadyReturned,

	#[error("authentication failed: {0}")]
	Unauthenticated(&'static str),

	#[error("permission denied: {0}")]
	Forbidden(&'static str),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("password hashing failed: {0}")]
	Hash(#[from] bcrypt::BcryptError),

	#[error("token encoding failed: {0}")]
	Token(#[source] jsonwebtoken::errors::Error),
}

impl AppError {
	/// A validation failure on a single field.
	pub fn field(field: &str, message: impl Into<String>) -> Self {
		let mut errors = FieldErrors::new();
		errors.insert(field.to_string(), vec![message.into()]);
		AppError::Validation(errors)
	}
}

impl From<ValidationErrors> for AppError {
	fn from(errors: ValidationErrors) -> Self {
		AppError::Validation(flatten(&errors))
	}
}

/// Runs the derived validators and returns whatever they reported, so
/// callers can append their own checks before failing.
pub fn field_errors(form: &impl Validate) -> FieldErrors {
	match form.validate() {
		Ok(()) => FieldErrors::new(),
		Err(errors) => flatten(&errors),
	}
}

fn flatten(errors: &ValidationErrors) -> FieldErrors {
	errors
		.field_errors()
		.into_iter()
		.map(|(field, problems)| {
			let messages = problems
				.iter()
				.map(|problem| match &problem.message {
					Some(message) => message.to_string(),
					None => format!("invalid value ({})", problem.code),
				})
				.collect();
			(field.to_string(), messages)
		})
		.collect()
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		let (status, body) = match &self {
			AppError::Validation(errors) => (StatusCode::BAD_REQUEST, json!({ "errors": errors })),
			AppError::BorrowLimitReached | AppError::NoCopiesAvailable | AppError::AlreadyReturned => {
				(StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
			}
			AppError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
			AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, json!({ "error": self.to_string() })),
			AppError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({ "error": self.to_string() })),
			AppError::Database(_) | AppError::Hash(_) | AppError::Token(_) => {
				tracing::error!(
					error.cause_chain = ?self,
					error.message = %self,
					"Unexpected error happened"
				);
				(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal server error" }))
			}
		};

		(status, Json(body)).into_response()
	}
}

pub type AppResult<T> = Result<T, AppError>;
