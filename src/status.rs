//! HTTP status codes as a typed enum.
//!
//! Only the codes a JSON API built on callie actually answers with. Use
//! [`Status`] anywhere a status is accepted: `Context::success`,
//! `Context::error`, `Response::builder().status()`, or as a bare handler
//! return value.
//!
//! ```rust
//! use callie::{Context, Response, Status};
//!
//! async fn create(ctx: Context) -> Response {
//!     ctx.success(serde_json::json!({ "id": 7 }), "Created", Status::Created)
//! }
//!
//! // return Status directly from a handler: callie wraps it
//! async fn delete(_ctx: Context) -> Status {
//!     Status::NoContent
//! }
//! ```

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                   // 200
    Created,              // 201
    NoContent,            // 204

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,           // 400
    Unauthorized,         // 401
    NotFound,             // 404
    TooManyRequests,      // 429

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError,  // 500
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::Created              => 201,
            Status::NoContent            => 204,
            Status::BadRequest           => 400,
            Status::Unauthorized         => 401,
            Status::NotFound             => 404,
            Status::TooManyRequests      => 429,
            Status::InternalServerError  => 500,
        }
    }
}
