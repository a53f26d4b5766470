use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use super::*;

fn payload(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Pool that never connects; statements would fail, so reaching the server
/// at all is itself a test failure for the validation paths.
fn detached_pool() -> Pool<Postgres> {
    let options = PgConnectOptions::new()
        .host("127.0.0.1")
        .port(1)
        .username("nobody");
    PgPoolOptions::new().connect_lazy_with(options)
}

#[test]
fn insert_sql_lists_columns_and_placeholders() {
    let columns = vec!["name".to_string(), "email".to_string()];
    let sql = build_insert_sql("users", &columns);
    assert_eq!(
        sql,
        "INSERT INTO \"users\" (\"name\", \"email\") VALUES ($1, $2) RETURNING *"
    );
}

#[test]
fn update_sql_binds_key_after_assignments() {
    let columns = vec!["name".to_string(), "active".to_string()];
    let sql = build_update_sql("users", &columns, "id");
    assert_eq!(
        sql,
        "UPDATE \"users\" SET \"name\" = $1, \"active\" = $2 WHERE \"id\" = $3 RETURNING *"
    );
}

#[test]
fn delete_sql_is_scoped_to_the_key() {
    let sql = build_delete_sql("orders", "order_id");
    assert_eq!(sql, "DELETE FROM \"orders\" WHERE \"order_id\" = $1");
}

#[test]
fn quoted_identifiers_survive_awkward_names() {
    let columns = vec!["select".to_string()];
    let sql = build_insert_sql("weird\"table", &columns);
    assert_eq!(
        sql,
        "INSERT INTO \"weird\"\"table\" (\"select\") VALUES ($1) RETURNING *"
    );
}

#[test]
fn split_payload_excludes_the_primary_key() {
    let data = payload(&[
        ("id", json!(7)),
        ("name", json!("ada")),
        ("active", json!(true)),
    ]);
    let (assignments, key_value) = split_update_payload(&data, "id");

    let keys: Vec<&str> = assignments.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["name", "active"]);
    assert_eq!(key_value, Some(&json!(7)));
}

#[test]
fn split_payload_with_only_the_key_sets_nothing() {
    let data = payload(&[("id", json!(7))]);
    let (assignments, key_value) = split_update_payload(&data, "id");
    assert!(assignments.is_empty());
    assert_eq!(key_value, Some(&json!(7)));
}

#[tokio::test]
async fn empty_insert_fails_before_any_statement() {
    let pool = detached_pool();
    let err = insert_row(&pool, "users", &Map::new()).await.unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
}

#[tokio::test]
async fn key_only_update_fails_before_any_statement() {
    let pool = detached_pool();
    let data = payload(&[("id", json!(1))]);
    let err = update_row(&pool, "users", &data, "id").await.unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
}

#[tokio::test]
async fn update_without_key_value_fails_validation() {
    let pool = detached_pool();
    let data = payload(&[("name", json!("ada"))]);
    let err = update_row(&pool, "users", &data, "id").await.unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
}
