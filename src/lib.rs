//! # callie
//!
//! A minimal HTTP API framework for small deployments.
//!
//! - Ordered routing with `:name` path parameters and prefix groups
//! - A fluent, parameter-binding SQL query builder over SQLite
//! - HS256 bearer tokens, bcrypt passwords and fixed-window rate limiting
//! - One JSON envelope for every answer:
//!   `{"success", "message", "data"}` or `{"success", "message", "errors"}`
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use callie::{Context, Database, Error, Response, Router, Server, Status};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let db = Arc::new(Database::open("app.db")?);
//!
//!     let app = Router::new()
//!         .get("/", |ctx: Context| async move {
//!             ctx.success("It works!", "Success", Status::Ok)
//!         })
//!         .get("/users/:id", move |ctx: Context| {
//!             let db = Arc::clone(&db);
//!             async move { show_user(&db, ctx) }
//!         });
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! fn show_user(db: &Database, ctx: Context) -> Result<Response, Error> {
//!     let id = ctx.param("id").unwrap_or_default();
//!     match db.table("users").where_eq("id", id).first()? {
//!         Some(user) => Ok(ctx.success(user, "Success", Status::Ok)),
//!         None => Ok(ctx.error("User not found", Status::NotFound, None)),
//!     }
//! }
//! ```

mod config;
mod context;
mod database;
mod error;
mod handler;
mod method;
mod pattern;
mod query;
mod response;
mod router;
mod server;
mod status;

pub mod security;

pub use config::Config;
pub use context::Context;
pub use database::{Database, RawOutcome, Row};
pub use error::Error;
pub use handler::Handler;
pub use method::Method;
pub use pattern::PathMatcher;
pub use query::{Direction, Operator, QueryBuilder, sanitize_column, sanitize_identifier};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use status::Status;
