//! Fluent query builder.
//!
//! A chain starts at [`Database::table`] and accumulates clauses until a
//! terminal call (`get`, `first`, `count`, `insert`, `update`, `delete`)
//! renders the SQL and runs it.
//!
//! ```rust,no_run
//! # use callie::{Database, Operator};
//! # fn demo(db: &Database) -> Result<(), callie::Error> {
//! let active = db.table("users")
//!     .select(["id", "email"])
//!     .where_eq("active", true)
//!     .where_op("age", Operator::Gte, 18)
//!     .order_by("created_at", "desc")
//!     .paginate(2, 20)
//!     .get()?;
//! # Ok(()) }
//! ```
//!
//! Identifiers cannot be bound as parameters, so they are filtered down to
//! `[A-Za-z0-9_]` (plus `.` and `*` where a column list allows them) before
//! they touch the SQL text. Values are always bound.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::database::{Database, Row};
use crate::error::Error;

/// Comparison operator of a `where_op` predicate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq      => "=",
            Self::NotEq   => "!=",
            Self::Lt      => "<",
            Self::Lte     => "<=",
            Self::Gt      => ">",
            Self::Gte     => ">=",
            Self::Like    => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "="        => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::NotEq),
            "<"        => Ok(Self::Lt),
            "<="       => Ok(Self::Lte),
            ">"        => Ok(Self::Gt),
            ">="       => Ok(Self::Gte),
            "LIKE"     => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            _          => Err(Error::validation(format!("Unsupported operator: {s}"), None)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// `DESC` in any case means descending; everything else is ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") { Self::Desc } else { Self::Asc }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc  => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Keeps `[A-Za-z0-9_]`. Used for table names, insert/update columns and
/// ORDER BY columns.
pub fn sanitize_identifier(s: &str) -> String {
    keep(s, &[])
}

/// Keeps `[A-Za-z0-9_.*]`, allowing `users.id` and `*` in select lists.
pub fn sanitize_column(s: &str) -> String {
    keep(s, &['.', '*'])
}

fn keep(s: &str, extra: &[char]) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || extra.contains(c))
        .collect()
}

/// A query under construction against one table.
pub struct QueryBuilder<'db> {
    db: &'db Database,
    table: String,
    columns: Vec<String>,
    predicates: Vec<String>,
    params: Vec<Value>,
    order: Option<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'db> QueryBuilder<'db> {
    pub(crate) fn new(db: &'db Database, table: &str) -> Self {
        Self {
            db,
            table: sanitize_identifier(table),
            columns: Vec::new(),
            predicates: Vec::new(),
            params: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    /// Restricts the selected columns. An empty list keeps `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> =
            columns.into_iter().map(|c| sanitize_column(c.as_ref())).collect();
        if !columns.is_empty() {
            self.columns = columns;
        }
        self
    }

    /// `field = ?` for every pair.
    pub fn where_all<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        pairs.into_iter().fold(self, |q, (k, v)| q.where_eq(k.as_ref(), v))
    }

    /// `field = ?`
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.where_op(field, Operator::Eq, value)
    }

    /// `field <op> ?`. Predicates are ANDed in call order.
    pub fn where_op(mut self, field: &str, op: Operator, value: impl Into<Value>) -> Self {
        let field = keep(field, &['.']);
        self.predicates.push(format!("{field} {op} ?"));
        self.params.push(value.into());
        self
    }

    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        self.order = Some((sanitize_identifier(field), Direction::parse(direction)));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// 1-based pages. Page `0` is treated as page `1`.
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1).saturating_mul(per_page))
    }

    /// The rendered `SELECT` and the parameters bound to its placeholders.
    pub fn to_sql(&self) -> (String, &[Value]) {
        let columns = if self.columns.is_empty() { "*".to_owned() } else { self.columns.join(", ") };
        let mut sql = format!("SELECT {columns} FROM {}{}", self.table, self.where_clause());

        if let Some((column, direction)) = &self.order {
            sql.push_str(&format!(" ORDER BY {column} {}", direction.as_str()));
        }
        // SQLite integers are signed 64-bit.
        let limit = self.limit.map(clamp_i64);
        let offset = self.offset.map(clamp_i64);
        match (limit, offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, self.params.as_slice())
    }

    /// All matching rows.
    pub fn get(self) -> Result<Vec<Row>, Error> {
        let (sql, params) = self.to_sql();
        self.db.fetch_all(&sql, params)
    }

    /// The first matching row, if any.
    pub fn first(self) -> Result<Option<Row>, Error> {
        Ok(self.limit(1).get()?.into_iter().next())
    }

    /// Number of matching rows. Ordering and paging are ignored.
    pub fn count(self) -> Result<u64, Error> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}{}", self.table, self.where_clause());
        let rows = self.db.fetch_all(&sql, &self.params)?;
        Ok(rows.first().and_then(|row| row.get("count")).and_then(Value::as_u64).unwrap_or(0))
    }

    /// Inserts one row and returns its id. An empty `data` inserts a row of
    /// column defaults.
    pub fn insert<I, K, V>(self, data: I) -> Result<i64, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = data.into_iter()
            .map(|(k, v)| (sanitize_identifier(k.as_ref()), v.into()))
            .unzip();

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let placeholders = vec!["?"; values.len()].join(", ");
            format!("INSERT INTO {} ({}) VALUES ({placeholders})", self.table, columns.join(", "))
        };

        Ok(self.db.execute(&sql, &values)?.last_insert_id)
    }

    /// Updates every matching row. `true` if at least one row changed.
    pub fn update<I, K, V>(self, data: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (sets, mut values): (Vec<String>, Vec<Value>) = data.into_iter()
            .map(|(k, v)| (format!("{} = ?", sanitize_identifier(k.as_ref())), v.into()))
            .unzip();
        if sets.is_empty() {
            return Err(Error::validation("Nothing to update", None));
        }

        let sql = format!("UPDATE {} SET {}{}", self.table, sets.join(", "), self.where_clause());
        values.extend(self.params);

        Ok(self.db.execute(&sql, &values)?.affected > 0)
    }

    /// Deletes every matching row. `true` if at least one row went away.
    pub fn delete(self) -> Result<bool, Error> {
        let sql = format!("DELETE FROM {}{}", self.table, self.where_clause());
        Ok(self.db.execute(&sql, &self.params)?.affected > 0)
    }

    fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn default_select_is_star() {
        let db = db();
        let q = db.table("users");
        assert_eq!(q.to_sql().0, "SELECT * FROM users");

        let q = db.table("users").select(Vec::<&str>::new());
        assert_eq!(q.to_sql().0, "SELECT * FROM users");
    }

    #[test]
    fn where_shapes_render_identically() {
        let db = db();
        let short = db.table("users").where_eq("id", 1);
        let long = db.table("users").where_op("id", Operator::Eq, 1);
        let map = db.table("users").where_all([("id", 1)]);

        assert_eq!(short.to_sql(), long.to_sql());
        assert_eq!(short.to_sql(), map.to_sql());
        assert_eq!(short.to_sql().0, "SELECT * FROM users WHERE id = ?");
        assert_eq!(short.to_sql().1, [json!(1)]);
    }

    #[test]
    fn params_align_with_placeholders() {
        let db = db();
        let q = db.table("posts")
            .where_all(json!({ "author": "al", "draft": false }).as_object().unwrap().clone())
            .where_op("views", ">=".parse().unwrap(), 10);
        let (sql, params) = q.to_sql();

        assert_eq!(sql.matches('?').count(), params.len());
        assert_eq!(sql, "SELECT * FROM posts WHERE author = ? AND draft = ? AND views >= ?");
        assert_eq!(params, [json!("al"), json!(false), json!(10)]);
    }

    #[test]
    fn full_select_clause_order() {
        let db = db();
        let q = db.table("users")
            .select(["id", "users.email", "*"])
            .where_eq("active", 1)
            .order_by("created_at", "DeSc")
            .limit(10)
            .offset(20);
        assert_eq!(
            q.to_sql().0,
            "SELECT id, users.email, * FROM users WHERE active = ? ORDER BY created_at DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn order_direction_defaults_to_asc() {
        let db = db();
        let q = db.table("users").order_by("name", "sideways");
        assert_eq!(q.to_sql().0, "SELECT * FROM users ORDER BY name ASC");
    }

    #[test]
    fn offset_without_limit_is_unbounded() {
        let db = db();
        assert_eq!(db.table("t").offset(5).to_sql().0, "SELECT * FROM t LIMIT -1 OFFSET 5");
    }

    #[test]
    fn paginate_floors_page_to_one() {
        let db = db();
        assert_eq!(db.table("t").paginate(0, 10).to_sql().0, "SELECT * FROM t LIMIT 10 OFFSET 0");
        assert_eq!(db.table("t").paginate(3, 10).to_sql().0, "SELECT * FROM t LIMIT 10 OFFSET 20");
    }

    #[test]
    fn oversized_paging_is_clamped_to_i64() {
        let db = db();
        assert_eq!(
            db.table("t").limit(u64::MAX).to_sql().0,
            format!("SELECT * FROM t LIMIT {}", i64::MAX),
        );
        assert_eq!(
            db.table("t").paginate(u64::MAX, 10).to_sql().0,
            format!("SELECT * FROM t LIMIT 10 OFFSET {}", i64::MAX),
        );
    }

    #[test]
    fn identifiers_are_stripped() {
        let db = db();
        let q = db.table("users;DROP TABLE users")
            .select(["email;DROP TABLE users", "u.*"])
            .where_eq("id; --", 1)
            .order_by("name`;", "asc");
        assert_eq!(
            q.to_sql().0,
            "SELECT emailDROPTABLEusers, u.* FROM usersDROPTABLEusers WHERE id = ? ORDER BY name ASC"
        );
    }

    #[test]
    fn operator_parsing() {
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::NotEq);
        assert_eq!("not   like".parse::<Operator>().unwrap(), Operator::NotLike);
        assert!("; DROP".parse::<Operator>().is_err());
    }

    #[test]
    fn update_without_columns_is_rejected() {
        let db = db();
        let err = db.table("t").update(Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
