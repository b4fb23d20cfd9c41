use axum::extract::State;
use maud::{html, Markup, DOCTYPE};

use crate::catalog;
use crate::error::AppResult;
use crate::types::BookFilter;
use crate::ServerState;

pub async fn catalog(State(state): State<ServerState>) -> AppResult<Markup> {
	let books = catalog::list_books(&state.db, BookFilter::default()).await?;

	Ok(html! {
		(DOCTYPE)
		html {
			head { title { "Catalog" } }
			body {
				table {
					thead { tr {
						td { "Title" }
						td { "Authors" }
						td { "Category" }
						td { "Available" }
					} }

					tbody {
						@for book in &books {
							tr {
								th { (book.title) }
								td {
									@for (i, author) in book.authors.iter().enumerate() {
										@if i > 0 { ", " }
										(author.name)
									}
								}
								td { (book.category.name) }
								td { (book.available_copies) " / " (book.total_copies) }
							}
						}
					}
				}
			}
		}
	})
}
