// =====================================================
// GENERIC QUERY BUILDER
// Filtered, sorted, paged reads for the data grid
// =====================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Pool, Postgres, Row};

use crate::db::catalog;
use crate::db::connection::ConnectionConfig;
use crate::db::sql_utils::{quote_ident, row_to_object};
use crate::error::DbError;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Request body of the paging endpoint. Row bounds arrive as JSON numbers
/// from the grid widget and may be absent or fractional, so they are kept
/// loose until `page_bounds` normalizes them.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TablePageRequest {
    pub connection: ConnectionConfig,
    pub table: String,
    #[serde(default)]
    pub start_row: Option<f64>,
    #[serde(default)]
    pub end_row: Option<f64>,
    #[serde(default)]
    pub filter_model: Option<Map<String, Value>>,
    #[serde(default)]
    pub sort_model: Option<Vec<SortSpec>>,
}

/// One column filter as the grid sends it. Compound or exotic filters do
/// not deserialize into this shape and are skipped.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub filter_type: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub col_id: String,
    pub sort: SortDirection,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub rows: Vec<Map<String, Value>>,
    pub last_row: i64,
}

/// Escapes LIKE metacharacters so a needle matches itself, not a pattern.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Turns the filter model into WHERE fragments plus the patterns to bind,
/// in matching order. Text matching is case-insensitive for every kind;
/// `equals` is exact (its needle is escaped, wildcards in the partial
/// kinds pass through as the grid sent them); filters that are not plain
/// text filters are silently ignored.
pub fn build_filters(filter_model: &Map<String, Value>) -> (Vec<String>, Vec<String>) {
    let mut conditions = Vec::new();
    let mut patterns = Vec::new();

    for (column, raw) in filter_model {
        let spec = match serde_json::from_value::<FilterSpec>(raw.clone()) {
            Ok(spec) => spec,
            Err(_) => continue,
        };
        if spec.filter_type != "text" {
            continue;
        }
        let needle = spec.filter.unwrap_or_default();
        let pattern = match spec.kind.as_str() {
            "contains" => format!("%{}%", needle),
            "equals" => escape_like(&needle),
            "startsWith" => format!("{}%", needle),
            "endsWith" => format!("%{}", needle),
            _ => continue,
        };
        patterns.push(pattern);
        conditions.push(format!(
            "{}::text ILIKE ${}",
            quote_ident(column),
            patterns.len()
        ));
    }

    (conditions, patterns)
}

pub fn build_where(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// ORDER BY clause applying every sort spec in the given order. Ties keep
/// server-default ordering.
pub fn build_order_by(sort_model: &[SortSpec]) -> String {
    if sort_model.is_empty() {
        return String::new();
    }
    let terms = sort_model
        .iter()
        .map(|s| format!("{} {}", quote_ident(&s.col_id), s.sort.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {}", terms)
}

/// Normalizes the grid's row bounds into (limit, offset). Missing or
/// non-finite bounds fall back to a 20-row page; the offset never goes
/// negative.
pub fn page_bounds(start_row: Option<f64>, end_row: Option<f64>) -> (i64, i64) {
    let start = start_row.filter(|v| v.is_finite());
    let end = end_row.filter(|v| v.is_finite());

    let limit = match (start, end) {
        (Some(s), Some(e)) => (e - s).max(0.0) as i64,
        _ => DEFAULT_PAGE_SIZE,
    };
    let offset = match start {
        Some(s) => s.max(0.0) as i64,
        None => 0,
    };
    (limit, offset)
}

/// One page of table data plus the filtered total. The count query shares
/// the filter predicate but not the sort or page bounds, and runs once per
/// page request.
pub async fn fetch_page(
    pool: &Pool<Postgres>,
    request: &TablePageRequest,
) -> Result<TablePage, DbError> {
    catalog::ensure_known_table(pool, &request.table).await?;
    let known_columns = catalog::table_columns(pool, &request.table).await?;

    let empty_filters = Map::new();
    let filter_model = request.filter_model.as_ref().unwrap_or(&empty_filters);
    let sort_model: &[SortSpec] = request.sort_model.as_deref().unwrap_or(&[]);

    for column in filter_model.keys() {
        ensure_known_column(&known_columns, column, &request.table)?;
    }
    for sort in sort_model {
        ensure_known_column(&known_columns, &sort.col_id, &request.table)?;
    }

    let (conditions, patterns) = build_filters(filter_model);
    let where_clause = build_where(&conditions);

    let count_sql = format!(
        "SELECT count(*) AS total FROM {}{}",
        quote_ident(&request.table),
        where_clause
    );
    let mut count_query = sqlx::query(&count_sql);
    for pattern in &patterns {
        count_query = count_query.bind(pattern);
    }
    let total: i64 = count_query.fetch_one(pool).await?.get("total");

    let (limit, offset) = page_bounds(request.start_row, request.end_row);
    let data_sql = format!(
        "SELECT * FROM {}{}{} LIMIT {} OFFSET {}",
        quote_ident(&request.table),
        where_clause,
        build_order_by(sort_model),
        limit,
        offset
    );
    log::info!(
        "grid page for {}: {} filters, {} sorts, rows {}..{}",
        request.table,
        patterns.len(),
        sort_model.len(),
        offset,
        offset + limit
    );

    let mut data_query = sqlx::query(&data_sql);
    for pattern in &patterns {
        data_query = data_query.bind(pattern);
    }
    let rows = data_query.fetch_all(pool).await?;

    Ok(TablePage {
        rows: rows.iter().map(row_to_object).collect(),
        last_row: total,
    })
}

fn ensure_known_column(known: &[String], column: &str, table: &str) -> Result<(), DbError> {
    if !known.iter().any(|c| c == column) {
        return Err(DbError::validation(format!(
            "unknown column '{}' on table '{}'",
            column, table
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
