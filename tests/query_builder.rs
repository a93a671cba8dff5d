use callie::{Database, Error, Operator};
use serde_json::{Value, json};

fn db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            age INTEGER,
            active INTEGER NOT NULL DEFAULT 1
        );",
    )
    .unwrap();
    db
}

fn seed(db: &Database) {
    for (email, age) in [("a@x.io", 20), ("b@x.io", 31), ("c@x.io", 45), ("d@x.io", 17)] {
        db.table("users").insert([("email", json!(email)), ("age", json!(age))]).unwrap();
    }
}

#[test]
fn insert_then_first_round_trips() {
    let db = db();
    let id = db.table("users").insert([("email", "a@b.com")]).unwrap();
    assert_eq!(id, 1);

    let row = db.table("users").where_eq("id", id).first().unwrap().unwrap();
    assert_eq!(row["email"], "a@b.com");
    assert_eq!(row["active"], 1);
}

#[test]
fn first_returns_none_when_nothing_matches() {
    let db = db();
    assert!(db.table("users").where_eq("id", 999).first().unwrap().is_none());
}

#[test]
fn get_filters_orders_and_pages() {
    let db = db();
    seed(&db);

    let rows = db.table("users")
        .select(["email"])
        .where_op("age", Operator::Gte, 18)
        .order_by("age", "desc")
        .paginate(1, 2)
        .get()
        .unwrap();
    let emails: Vec<&Value> = rows.iter().map(|r| &r["email"]).collect();
    assert_eq!(emails, [&json!("c@x.io"), &json!("b@x.io")]);
    assert_eq!(rows[0].len(), 1);

    let page_two = db.table("users")
        .where_op("age", Operator::Gte, 18)
        .order_by("age", "desc")
        .paginate(2, 2)
        .get()
        .unwrap();
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0]["email"], "a@x.io");
}

#[test]
fn count_ignores_order_and_limit() {
    let db = db();
    seed(&db);

    let q = db.table("users").where_op("age", Operator::Lt, 40).order_by("age", "asc").limit(1);
    assert_eq!(q.count().unwrap(), 3);
    assert_eq!(db.table("users").count().unwrap(), 4);
}

#[test]
fn where_all_ands_every_pair() {
    let db = db();
    seed(&db);

    let filter = json!({ "age": 31, "email": "b@x.io" });
    let rows = db.table("users").where_all(filter.as_object().unwrap().clone()).get().unwrap();
    assert_eq!(rows.len(), 1);

    let none = db.table("users").where_all([("age", json!(31)), ("email", json!("a@x.io"))]).get().unwrap();
    assert!(none.is_empty());
}

#[test]
fn update_binds_set_values_before_where_values() {
    let db = db();
    seed(&db);

    let changed = db.table("users")
        .where_eq("email", "b@x.io")
        .update([("age", json!(32)), ("active", json!(false))])
        .unwrap();
    assert!(changed);

    let row = db.table("users").where_eq("email", "b@x.io").first().unwrap().unwrap();
    assert_eq!(row["age"], 32);
    assert_eq!(row["active"], 0);

    let untouched = db.table("users").where_eq("email", "nobody").update([("age", 1)]).unwrap();
    assert!(!untouched);
}

#[test]
fn delete_reports_whether_rows_went_away() {
    let db = db();
    seed(&db);

    assert!(db.table("users").where_op("age", Operator::Lt, 18).delete().unwrap());
    assert!(!db.table("users").where_op("age", Operator::Lt, 18).delete().unwrap());
    assert_eq!(db.table("users").count().unwrap(), 3);
}

#[test]
fn failures_are_wrapped_as_query_failed() {
    let db = db();
    db.table("users").insert([("email", "dup@x.io")]).unwrap();

    let err = db.table("users").insert([("email", "dup@x.io")]).unwrap_err();
    assert!(matches!(err, Error::QueryFailed(_)));
    assert!(err.to_string().contains("UNIQUE"));

    let err = db.table("missing").get().unwrap_err();
    assert!(matches!(err, Error::QueryFailed(_)));
}

#[test]
fn injected_identifiers_cannot_escape() {
    let db = db();
    seed(&db);

    let q = db.table("users;DROP TABLE users").select(["email;DROP TABLE users"]);
    assert_eq!(q.to_sql().0, "SELECT emailDROPTABLEusers FROM usersDROPTABLEusers");
    assert!(q.get().is_err());

    // The real table is still there.
    assert_eq!(db.table("users").count().unwrap(), 4);
}

#[test]
fn insert_keys_are_sanitized() {
    let db = db();
    seed(&db);

    // The key collapses to the unknown column `emailDELETEFROMusers`.
    let err = db.table("users").insert([("email); DELETE FROM users; --", "x@x.io")]).unwrap_err();
    assert!(matches!(err, Error::QueryFailed(_)));
    assert_eq!(db.table("users").count().unwrap(), 4);
}

#[test]
fn empty_insert_uses_column_defaults() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE counters (id INTEGER PRIMARY KEY, n INTEGER NOT NULL DEFAULT 7);")
        .unwrap();

    let id = db.table("counters").insert(Vec::<(&str, Value)>::new()).unwrap();
    assert_eq!(id, 1);

    let row = db.table("counters").where_eq("id", id).first().unwrap().unwrap();
    assert_eq!(Value::Object(row), json!({ "id": 1, "n": 7 }));
}

#[test]
fn page_past_sqlite_range_is_empty_not_an_error() {
    let db = db();
    seed(&db);

    assert!(db.table("users").paginate(u64::MAX, 10).get().unwrap().is_empty());
    assert_eq!(db.table("users").limit(u64::MAX).get().unwrap().len(), 4);
}
