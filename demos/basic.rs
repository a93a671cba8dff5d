//! Minimal callie example: a users API with login, a protected route and
//! global rate limiting.
//!
//! Run with:
//!   RUST_LOG=info JWT_SECRET=dev cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"email":"al@example.com","password":"secret"}'
//!   curl http://localhost:3000/users/1
//!   curl -X DELETE http://localhost:3000/users/1
//!   curl -X POST http://localhost:3000/auth/login \
//!        -H 'content-type: application/json' \
//!        -d '{"email":"al@example.com","password":"secret"}'
//!   curl http://localhost:3000/auth/me -H "Authorization: Bearer $TOKEN"

use std::process::ExitCode;
use std::sync::Arc;

use callie::security::{Claims, FileStore, INVALID_TOKEN, RateLimiter, TokenCodec, hash_password, verify_password};
use callie::{Config, Context, Database, Error, IntoResponse, Response, Router, Server, Status};
use serde_json::{Value, json};

struct App {
    db: Database,
    tokens: TokenCodec,
    token_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    // A database that cannot be opened is fatal: nothing is served.
    let db = Database::connect(&config)?;
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL
        );",
    )?;

    let app = Arc::new(App {
        db,
        tokens: TokenCodec::new(&config.jwt_secret),
        token_ttl_secs: config.token_ttl_secs,
    });
    let limiter = RateLimiter::new(
        FileStore::new(&config.cache_dir)?,
        config.rate_limit,
        config.rate_limit_window_secs,
    );

    let mut router = Router::new()
        .rate_limit(limiter)
        .get("/", |ctx: Context| async move {
            ctx.success(json!({ "message": "Welcome to Callie!", "status": "It works!" }), "Success", Status::Ok)
        })
        .get("/users", with(&app, list_users))
        .post("/users", with(&app, create_user))
        .get("/users/:id", with(&app, show_user))
        .delete("/users/:id", with(&app, delete_user))
        .group("/auth", |r| r
            .post("/login", with(&app, login))
            .get("/me", with(&app, me)));
    if let Some(base) = &config.base_path {
        router = router.base_path(base);
    }

    Server::bind(config.addr.clone()).serve(router).await
}

/// Adapts a synchronous `fn(&App, Context)` into a route handler.
fn with(
    app: &Arc<App>,
    f: fn(&App, Context) -> Result<Response, Error>,
) -> impl Fn(Context) -> std::future::Ready<Result<Response, Error>> + Send + Sync + 'static {
    let app = Arc::clone(app);
    move |ctx: Context| std::future::ready(f(&app, ctx))
}

// GET /users?page=1
fn list_users(app: &App, ctx: Context) -> Result<Response, Error> {
    let page = ctx.query("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let users = app.db.table("users").select(["id", "email"]).paginate(page, 10).get()?;
    Ok(ctx.success(users, "Success", Status::Ok))
}

// POST /users
fn create_user(app: &App, ctx: Context) -> Result<Response, Error> {
    let Some(email) = ctx.input("email").and_then(Value::as_str) else {
        return Err(Error::validation("Email is required", None));
    };
    let password = ctx.input("password").and_then(Value::as_str).unwrap_or_default();

    let id = app.db.table("users").insert([
        ("email", json!(email)),
        ("password", json!(hash_password(password)?)),
    ])?;

    Ok(ctx.success(json!({ "id": id }), "User created successfully", Status::Created))
}

// GET /users/:id
fn show_user(app: &App, ctx: Context) -> Result<Response, Error> {
    let id = ctx.param("id").unwrap_or_default();
    match app.db.table("users").select(["id", "email"]).where_eq("id", id).first()? {
        Some(user) => Ok(ctx.success(user, "Success", Status::Ok)),
        None => Ok(ctx.error("User not found", Status::NotFound, None)),
    }
}

// DELETE /users/:id
fn delete_user(app: &App, ctx: Context) -> Result<Response, Error> {
    let id = ctx.param("id").unwrap_or_default();
    if app.db.table("users").where_eq("id", id).delete()? {
        Ok(Status::NoContent.into_response())
    } else {
        Ok(ctx.error("User not found", Status::NotFound, None))
    }
}

// POST /auth/login
fn login(app: &App, ctx: Context) -> Result<Response, Error> {
    let email = ctx.input("email").and_then(Value::as_str).unwrap_or_default();
    let password = ctx.input("password").and_then(Value::as_str).unwrap_or_default();

    let user = app.db.table("users").where_eq("email", email).first()?;
    let Some(user) = user.filter(|u| verify_password(password, u["password"].as_str().unwrap_or_default())) else {
        return Ok(ctx.error("Invalid credentials", Status::Unauthorized, None));
    };

    let mut claims = Claims::new();
    claims.insert("sub".to_owned(), user["id"].clone());
    let token = app.tokens.issue(claims, app.token_ttl_secs);
    Ok(ctx.success(json!({ "token": token }), "Success", Status::Ok))
}

// GET /auth/me
fn me(app: &App, ctx: Context) -> Result<Response, Error> {
    let claims = app.tokens.authenticate(&ctx)?;
    let sub = claims.get("sub").cloned().ok_or(Error::Unauthorized(INVALID_TOKEN))?;
    let user = app.db.table("users").select(["id", "email"]).where_eq("id", sub).first()?;
    Ok(ctx.success(user, "Success", Status::Ok))
}
