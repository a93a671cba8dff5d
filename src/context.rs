//! Per-request context.
//!
//! A [`Context`] is built once per request and handed to the matched handler
//! by value. It carries everything parsed from the wire (method, path, query,
//! body, headers, client address) plus the parameters captured by the route
//! pattern, and it builds the JSON envelopes the handler answers with.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::method::Method;
use crate::response::Response;
use crate::status::Status;

pub struct Context {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: HashMap<String, String>,
    pub(crate) body: Value,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<IpAddr>,
}

impl Context {
    /// A context with no query, headers or body. Chain the `with_*` methods to
    /// fill it in; the server does the same thing from the parsed request.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: Value::Object(Map::new()),
            headers: Vec::new(),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Parses a raw `a=1&b=two` query string.
    pub fn with_query(mut self, raw: &str) -> Self {
        self.query = url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Decodes a raw body: form-encoded when the content type says so,
    /// JSON otherwise. Anything unreadable becomes an empty object.
    pub fn with_raw_body(mut self, raw: &[u8]) -> Self {
        self.body = parse_body(self.header("content-type"), raw);
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub fn remote_addr(&self) -> Option<IpAddr> { self.remote_addr }

    /// The decoded request body. Always an object unless the client sent a
    /// JSON array or scalar.
    pub fn body(&self) -> &Value { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns a query-string parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns one top-level field of the body.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Deserialises the whole body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| Error::validation("Invalid request body", Some(Value::String(e.to_string()))))
    }

    /// Identity used for rate limiting: the peer IP, or `"unknown"`.
    pub fn client_id(&self) -> String {
        self.remote_addr.map_or_else(|| "unknown".to_owned(), |ip| ip.to_string())
    }

    /// Answers with the success envelope.
    pub fn success(&self, data: impl Serialize, message: &str, status: Status) -> Response {
        Response::success(data, message, status)
    }

    /// Answers with the failure envelope.
    pub fn error(&self, message: &str, status: Status, errors: Option<Value>) -> Response {
        Response::failure(message, status, errors)
    }
}

const FORM: &str = "application/x-www-form-urlencoded";

fn parse_body(content_type: Option<&str>, raw: &[u8]) -> Value {
    let is_form = content_type.is_some_and(|ct| {
        ct.trim_start()
            .get(..FORM.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FORM))
    });

    if is_form {
        let fields = url::form_urlencoded::parse(raw)
            .into_owned()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Value::Object(fields);
    }

    serde_json::from_slice(raw).unwrap_or_else(|_| Value::Object(Map::new()))
}
