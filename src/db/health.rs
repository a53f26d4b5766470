// =====================================================
// BLOAT & HEALTH ESTIMATOR
// Heuristic bloat math, scan statistics, maintenance badge
// =====================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};

use crate::db::catalog::SCHEMA;
use crate::error::DbError;

/// Tables whose estimated bloat exceeds this percentage are candidates for a
/// full rewrite.
pub const BLOAT_THRESHOLD: f64 = 20.0;

/// Both vacuum and analyze must fall inside this window for a "Good" badge.
pub const FRESH_WINDOW_DAYS: i64 = 7;

const DATA_HEADER_BYTES: f64 = 24.0;
const TUPLE_HEADER_BYTES: f64 = 23.0;
const ITEM_POINTER_BYTES: f64 = 4.0;
const ALIGNMENT: f64 = 8.0;

/// Estimated bloat percentage of one table. The heuristic compares the
/// on-disk size against an idealized size derived from the tuple count and
/// per-tuple header overhead; it is knowingly noisy for small or narrow
/// tables and is never treated as exact.
///
/// Returns `None` for empty relations, so a missing estimate is
/// distinguishable from a genuine zero.
pub fn estimate_bloat_ratio(
    data_length: f64,
    reltuples: f64,
    column_count: i64,
    has_nullable_columns: bool,
) -> Option<f64> {
    if data_length <= 0.0 {
        return None;
    }

    let null_bitmap = if has_nullable_columns {
        ((7 + column_count) / 8) as f64
    } else {
        0.0
    };

    // Data header padded up to the next alignment boundary, then tuple
    // header, null bitmap and line pointer.
    let remainder = DATA_HEADER_BYTES % ALIGNMENT;
    let aligned_data_header = if remainder == 0.0 {
        DATA_HEADER_BYTES
    } else {
        DATA_HEADER_BYTES + ALIGNMENT - remainder
    };
    let per_tuple = aligned_data_header + TUPLE_HEADER_BYTES + null_bitmap + ITEM_POINTER_BYTES;

    let ratio = (data_length - reltuples * per_tuple) / data_length * 100.0;
    Some(ratio.clamp(0.0, 100.0))
}

#[derive(Serialize, Clone, Debug)]
pub struct TableBloatStat {
    pub table_name: String,
    pub bloat_ratio: Option<f64>,
}

impl TableBloatStat {
    pub fn is_bloated(&self) -> bool {
        self.bloat_ratio.map(|r| r > BLOAT_THRESHOLD).unwrap_or(false)
    }
}

/// Per-table size and column statistics with the bloat heuristic applied.
pub async fn table_bloat_stats(pool: &Pool<Postgres>) -> Result<Vec<TableBloatStat>, DbError> {
    let rows = sqlx::query(
        "SELECT c.relname::text AS table_name,
                c.reltuples::float8 AS reltuples,
                pg_relation_size(c.oid) AS data_length,
                count(a.attnum) AS column_count,
                count(a.attnum) FILTER (WHERE NOT a.attnotnull) AS nullable_columns
         FROM pg_class c
         JOIN pg_namespace n ON n.oid = c.relnamespace
         JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
         WHERE n.nspname = $1 AND c.relkind = 'r'
         GROUP BY c.oid, c.relname, c.reltuples
         ORDER BY c.relname",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("fetching bloat statistics"))?;

    Ok(rows
        .iter()
        .map(|row| {
            let reltuples: f64 = row.get("reltuples");
            let data_length: i64 = row.get("data_length");
            let column_count: i64 = row.get("column_count");
            let nullable_columns: i64 = row.get("nullable_columns");
            TableBloatStat {
                table_name: row.get("table_name"),
                bloat_ratio: estimate_bloat_ratio(
                    data_length as f64,
                    reltuples.max(0.0),
                    column_count,
                    nullable_columns > 0,
                ),
            }
        })
        .collect())
}

#[derive(Serialize, Clone, Debug)]
pub struct UnusedIndex {
    pub index_name: String,
    pub table_name: String,
}

/// Indexes the statistics collector has never seen a scan on.
pub async fn unused_indexes(pool: &Pool<Postgres>) -> Result<Vec<UnusedIndex>, DbError> {
    let rows = sqlx::query(
        "SELECT indexrelname::text AS index_name, relname::text AS table_name
         FROM pg_stat_user_indexes
         WHERE schemaname = $1 AND idx_scan = 0
         ORDER BY indexrelname",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("finding unused indexes"))?;

    Ok(rows
        .iter()
        .map(|row| UnusedIndex {
            index_name: row.get("index_name"),
            table_name: row.get("table_name"),
        })
        .collect())
}

/// One table's health inputs for planning. Always recomputed from the
/// statistics views; never cached between passes.
#[derive(Serialize, Clone, Debug)]
pub struct TableHealthSample {
    pub table_name: String,
    pub bloat_ratio: Option<f64>,
    pub index_scans: i64,
    pub sequential_scans: i64,
    pub unused_indexes: Vec<String>,
}

impl TableHealthSample {
    pub fn is_bloated(&self) -> bool {
        self.bloat_ratio.map(|r| r > BLOAT_THRESHOLD).unwrap_or(false)
    }
}

pub async fn collect_health_samples(
    pool: &Pool<Postgres>,
) -> Result<Vec<TableHealthSample>, DbError> {
    let (bloat_stats, unused, scans) = tokio::try_join!(
        table_bloat_stats(pool),
        unused_indexes(pool),
        table_scan_counts(pool),
    )?;

    let mut unused_by_table: HashMap<String, Vec<String>> = HashMap::new();
    for index in unused {
        unused_by_table
            .entry(index.table_name)
            .or_default()
            .push(index.index_name);
    }

    Ok(bloat_stats
        .into_iter()
        .map(|stat| {
            let (index_scans, sequential_scans) =
                scans.get(&stat.table_name).copied().unwrap_or((0, 0));
            TableHealthSample {
                unused_indexes: unused_by_table
                    .remove(&stat.table_name)
                    .unwrap_or_default(),
                table_name: stat.table_name,
                bloat_ratio: stat.bloat_ratio,
                index_scans,
                sequential_scans,
            }
        })
        .collect())
}

async fn table_scan_counts(
    pool: &Pool<Postgres>,
) -> Result<HashMap<String, (i64, i64)>, DbError> {
    let rows = sqlx::query(
        "SELECT relname::text AS table_name,
                COALESCE(idx_scan, 0) AS index_scans,
                COALESCE(seq_scan, 0) AS sequential_scans
         FROM pg_stat_user_tables
         WHERE schemaname = $1",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("fetching scan statistics"))?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<String, _>("table_name"),
                (
                    row.get::<i64, _>("index_scans"),
                    row.get::<i64, _>("sequential_scans"),
                ),
            )
        })
        .collect())
}

// --- Maintenance badge ---

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaintenanceStatus {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Warning")]
    Warning,
    #[serde(rename = "Needs Maintenance")]
    NeedsMaintenance,
    #[serde(rename = "Never Run")]
    NeverRun,
}

/// Human-facing maintenance badge. Purely a function of the two timestamps;
/// the planner never consults it.
pub fn classify_maintenance(
    last_vacuum: Option<DateTime<Utc>>,
    last_analyze: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> MaintenanceStatus {
    let (vacuum, analyze) = match (last_vacuum, last_analyze) {
        (Some(v), Some(a)) => (v, a),
        _ => return MaintenanceStatus::NeverRun,
    };

    let vacuum_fresh = within_fresh_window(vacuum, now);
    let analyze_fresh = within_fresh_window(analyze, now);
    match (vacuum_fresh, analyze_fresh) {
        (true, true) => MaintenanceStatus::Good,
        (true, false) | (false, true) => MaintenanceStatus::Warning,
        (false, false) => MaintenanceStatus::NeedsMaintenance,
    }
}

/// Whole days since the most recent of the two timestamps, floored. `None`
/// when either has never happened.
pub fn days_since_maintenance(
    last_vacuum: Option<DateTime<Utc>>,
    last_analyze: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    let most_recent = last_vacuum?.max(last_analyze?);
    Some((now - most_recent).num_days())
}

fn within_fresh_window(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - ts).num_days() < FRESH_WINDOW_DAYS
}

#[cfg(test)]
mod tests;
