//! Ordered request router.
//!
//! Routes are tried in the order they were registered and the first one whose
//! method and pattern both match wins. There is no specificity ranking:
//! register `/users/me` before `/users/:id` or the parameterised route will
//! swallow it.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::pattern::PathMatcher;
use crate::response::{IntoResponse, Response};
use crate::security::RateLimiter;
use crate::status::Status;

struct Route {
    method: Method,
    matcher: PathMatcher,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every registration method returns `self` so routes chain naturally.
///
/// ```rust,no_run
/// # use callie::{Context, Response, Router};
/// # async fn me(_: Context) -> Response { Response::text("") }
/// # async fn show(_: Context) -> Response { Response::text("") }
/// # async fn create(_: Context) -> Response { Response::text("") }
/// Router::new()
///     .base_path("/api")
///     .group("/users", |r| r
///         .get("/me",  me)
///         .get("/:id", show)
///         .post("",    create));
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    prefixes: Vec<String>,
    base_path: Option<String>,
    limiter: Option<Arc<RateLimiter>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair under the active group
    /// prefix. Path parameters use `:name` syntax.
    ///
    /// # Panics
    ///
    /// Panics if the same placeholder name appears twice in one path.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let full = format!("{}{path}", self.prefixes.concat());
        let matcher = PathMatcher::compile(&full)
            .unwrap_or_else(|e| panic!("invalid route `{full}`: {e}"));
        self.routes.push(Route { method, matcher, handler: handler.into_boxed_handler() });
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Registers every route added inside `routes` under `prefix`.
    /// Groups nest; the prefix is popped again once `routes` returns.
    pub fn group(mut self, prefix: &str, routes: impl FnOnce(Self) -> Self) -> Self {
        self.prefixes.push(prefix.to_owned());
        let mut router = routes(self);
        router.prefixes.pop();
        router
    }

    /// Prefix the deployment is mounted under (e.g. `/api` when the proxy
    /// forwards `/api/users` untouched). Stripped before matching.
    pub fn base_path(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        self.base_path = (!prefix.is_empty()).then(|| prefix.to_owned());
        self
    }

    /// Checks every request against `limiter` before routing, keyed by the
    /// client address.
    pub fn rate_limit(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    /// Routes one request and produces one response.
    ///
    /// Handler errors become their JSON envelope. A handler panic is caught
    /// here and reported as a generic `500` carrying the panic message.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        if let Some(limiter) = &self.limiter {
            if let Err(e) = limiter.check(&ctx.client_id()) {
                warn!(client = %ctx.client_id(), path = %ctx.path, "rate limit exceeded");
                return e.into_response();
            }
        }

        let path = self.strip_base(&ctx.path).to_owned();
        let method = ctx.method;

        let route = self.routes.iter()
            .filter(|route| route.method == method)
            .find_map(|route| route.matcher.captures(&path).map(|params| (route, params)));

        let response = match route {
            Some((route, params)) => {
                ctx.params = params;
                invoke(Arc::clone(&route.handler), ctx).await
            }
            None => Error::RouteNotFound(path.clone()).into_response(),
        };

        debug!(%method, %path, status = response.status, "dispatched");
        response
    }

    fn strip_base<'a>(&self, path: &'a str) -> &'a str {
        let rest = match &self.base_path {
            Some(base) => match path.strip_prefix(base.as_str()) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
                _ => path,
            },
            None => path,
        };
        if rest.is_empty() { "/" } else { rest }
    }
}

/// Runs the handler on its own task so a panic stays contained to this request.
async fn invoke(handler: BoxedHandler, ctx: Context) -> Response {
    match tokio::spawn(async move { handler.call(ctx).await }).await {
        Ok(response) => response,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!(%message, "handler panicked");
            Response::failure(&message, Status::InternalServerError, None)
        }
        Err(e) => {
            error!("handler task failed: {e}");
            Response::failure(&e.to_string(), Status::InternalServerError, None)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Internal Server Error".to_owned()
    }
}
