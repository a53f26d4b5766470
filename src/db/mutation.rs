// =====================================================
// ROW MUTATION EXECUTOR
// Single-row insert/update/delete with validated
// identifiers and bound values
// =====================================================

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{Pool, Postgres};

use crate::db::catalog;
use crate::db::sql_utils::{bind_value, quote_ident, row_to_object};
use crate::error::DbError;

/// Statement text for an insert over the given columns, with `RETURNING *`
/// so the caller gets the row as the database stored it.
pub fn build_insert_sql(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        quote_ident(table),
        column_list,
        placeholders
    )
}

/// Statement text for an update of the given columns, keyed on the primary
/// key bound as the final placeholder.
pub fn build_update_sql(table: &str, columns: &[String], primary_key: &str) -> String {
    let set_clause = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING *",
        quote_ident(table),
        set_clause,
        quote_ident(primary_key),
        columns.len() + 1
    )
}

/// Statement text for a delete of exactly one primary-key match.
pub fn build_delete_sql(table: &str, primary_key: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        quote_ident(table),
        quote_ident(primary_key)
    )
}

/// Splits an update payload into the columns to set and the key value to
/// match on. The primary-key column itself is never part of the SET list.
pub fn split_update_payload<'a>(
    row_data: &'a Map<String, Value>,
    primary_key: &str,
) -> (Vec<(&'a String, &'a Value)>, Option<&'a Value>) {
    let assignments = row_data
        .iter()
        .filter(|(key, _)| key.as_str() != primary_key)
        .collect();
    (assignments, row_data.get(primary_key))
}

async fn ensure_known_columns(
    pool: &Pool<Postgres>,
    table: &str,
    requested: &[&String],
) -> Result<(), DbError> {
    let known = catalog::table_columns(pool, table).await?;
    for column in requested {
        if !known.iter().any(|c| c == *column) {
            return Err(DbError::validation(format!(
                "unknown column '{}' on table '{}'",
                column, table
            )));
        }
    }
    Ok(())
}

/// Inserts one row and returns it as stored. An empty payload is rejected
/// before any catalog lookup or statement is issued.
pub async fn insert_row(
    pool: &Pool<Postgres>,
    table: &str,
    row_data: &Map<String, Value>,
) -> Result<Map<String, Value>, DbError> {
    if row_data.is_empty() {
        return Err(DbError::validation("no data to insert"));
    }

    catalog::ensure_known_table(pool, table).await?;
    let columns: Vec<&String> = row_data.keys().collect();
    ensure_known_columns(pool, table, &columns).await?;

    let owned_columns: Vec<String> = columns.iter().map(|c| (*c).clone()).collect();
    let sql = build_insert_sql(table, &owned_columns);
    log::info!("inserting row into {}", table);

    let mut query = sqlx::query(&sql);
    for value in row_data.values() {
        query = bind_value(query, value);
    }
    let row = query.fetch_one(pool).await?;
    Ok(row_to_object(&row))
}

/// Updates one row identified by its primary key and returns the updated
/// row. Fails validation when the payload sets nothing besides the key.
pub async fn update_row(
    pool: &Pool<Postgres>,
    table: &str,
    row_data: &Map<String, Value>,
    primary_key: &str,
) -> Result<Map<String, Value>, DbError> {
    let (assignments, key_value) = split_update_payload(row_data, primary_key);
    if assignments.is_empty() {
        return Err(DbError::validation("no columns to update"));
    }
    let key_value =
        key_value.ok_or_else(|| DbError::validation("row data is missing the primary key"))?;

    catalog::ensure_known_table(pool, table).await?;
    let mut requested: Vec<&String> = assignments.iter().map(|(key, _)| *key).collect();
    let pk_owned = primary_key.to_string();
    requested.push(&pk_owned);
    ensure_known_columns(pool, table, &requested).await?;

    let columns: Vec<String> = assignments.iter().map(|(key, _)| (*key).clone()).collect();
    let sql = build_update_sql(table, &columns, primary_key);
    log::info!("updating row in {} by {}", table, primary_key);

    let mut query = sqlx::query(&sql);
    for (_, value) in &assignments {
        query = bind_value(query, value);
    }
    query = bind_value(query, key_value);
    let row = query.fetch_one(pool).await?;
    Ok(row_to_object(&row))
}

#[derive(Serialize, Debug)]
pub struct DeleteResult {
    pub success: bool,
}

/// Deletes the row matching the primary-key value. Exactly one statement,
/// scoped to the key.
pub async fn delete_row(
    pool: &Pool<Postgres>,
    table: &str,
    primary_key: &str,
    primary_key_value: &Value,
) -> Result<DeleteResult, DbError> {
    catalog::ensure_known_table(pool, table).await?;
    let pk_owned = primary_key.to_string();
    ensure_known_columns(pool, table, &[&pk_owned]).await?;

    let sql = build_delete_sql(table, primary_key);
    log::info!("deleting row from {} by {}", table, primary_key);

    let query = bind_value(sqlx::query(&sql), primary_key_value);
    query.execute(pool).await?;
    Ok(DeleteResult { success: true })
}

#[cfg(test)]
mod tests;
