// =====================================================
// CATALOG INSPECTOR
// Read-only system-catalog queries; health report
// sub-queries fan out concurrently and join at the end
// =====================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{Pool, Postgres, Row};

use crate::db::connection::ADMIN_DATABASE;
use crate::db::health::{self, MaintenanceStatus};
use crate::db::sql_utils::{quote_ident, row_to_object};
use crate::error::DbError;

/// Schema all table-level operations work against.
pub const SCHEMA: &str = "public";

const TABLE_DATA_CAP: i64 = 1000;

pub async fn list_databases(pool: &Pool<Postgres>) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query(
        "SELECT datname FROM pg_database
         WHERE datistemplate = false AND datname <> $1
         ORDER BY datname",
    )
    .bind(ADMIN_DATABASE)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("listing databases"))?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("datname"))
        .collect())
}

pub async fn list_tables(pool: &Pool<Postgres>) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = $1 AND table_type = 'BASE TABLE'
         ORDER BY table_name",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("listing tables"))?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("table_name"))
        .collect())
}

/// Rejects table names that are not present in the schema. Identifiers come
/// from the request body, so membership is checked before any interpolation.
pub async fn ensure_known_table(pool: &Pool<Postgres>, table: &str) -> Result<(), DbError> {
    let tables = list_tables(pool).await?;
    if !tables.iter().any(|t| t == table) {
        return Err(DbError::validation(format!(
            "unknown table '{}' in schema '{}'",
            table, SCHEMA
        )));
    }
    Ok(())
}

/// Column names of a table in physical order.
pub async fn table_columns(pool: &Pool<Postgres>, table: &str) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query(
        "SELECT column_name FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2
         ORDER BY ordinal_position",
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("listing table columns"))?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("column_name"))
        .collect())
}

#[derive(Serialize, Debug)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
}

pub async fn table_structure(
    pool: &Pool<Postgres>,
    table: &str,
) -> Result<Vec<ColumnInfo>, DbError> {
    let rows = sqlx::query(
        "SELECT column_name, data_type, is_nullable, column_default
         FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2
         ORDER BY ordinal_position",
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(DbError::catalog("describing table"))?;

    Ok(rows
        .iter()
        .map(|row| ColumnInfo {
            column_name: row.get("column_name"),
            data_type: row.get("data_type"),
            is_nullable: row.get("is_nullable"),
            column_default: row.try_get("column_default").ok(),
        })
        .collect())
}

#[derive(Serialize, Debug)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Snapshot read of a table, capped at 1000 rows.
pub async fn table_data(pool: &Pool<Postgres>, table: &str) -> Result<TableData, DbError> {
    ensure_known_table(pool, table).await?;
    let columns = table_columns(pool, table).await?;

    let query = format!(
        "SELECT * FROM {} LIMIT {}",
        quote_ident(table),
        TABLE_DATA_CAP
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .await
        .map_err(DbError::catalog("sampling table data"))?;

    Ok(TableData {
        columns,
        rows: rows.iter().map(row_to_object).collect(),
    })
}

// --- Table statistics ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub row_count: i64,
    pub size: String,
    pub last_analyzed: String,
    pub index_count: i64,
    pub column_count: i64,
    pub table_type: String,
    pub has_indexes: bool,
    pub has_primary_key: bool,
    pub has_foreign_keys: bool,
    pub has_nullable_columns: bool,
}

/// Statistics card for one table. The six sub-queries run concurrently and
/// the result is assembled only after all succeed.
pub async fn table_stats(pool: &Pool<Postgres>, table: &str) -> Result<TableStats, DbError> {
    ensure_known_table(pool, table).await?;

    let (row_count, size, last_analyze, index_count, column_counts, key_counts) = tokio::try_join!(
        table_row_count(pool, table),
        table_pretty_size(pool, table),
        table_last_analyze(pool, table),
        table_index_count(pool, table),
        table_column_counts(pool, table),
        table_key_counts(pool, table),
    )?;

    Ok(assemble_table_stats(
        row_count,
        size,
        last_analyze,
        index_count,
        column_counts,
        key_counts,
    ))
}

fn assemble_table_stats(
    row_count: i64,
    size: String,
    last_analyze: Option<DateTime<Utc>>,
    index_count: i64,
    (column_count, nullable_count): (i64, i64),
    (pk_count, fk_count): (i64, i64),
) -> TableStats {
    TableStats {
        row_count,
        size,
        last_analyzed: format_maintenance_date(last_analyze),
        index_count,
        column_count,
        table_type: "BASE TABLE".to_string(),
        has_indexes: index_count > 0,
        has_primary_key: pk_count > 0,
        has_foreign_keys: fk_count > 0,
        has_nullable_columns: nullable_count > 0,
    }
}

async fn table_row_count(pool: &Pool<Postgres>, table: &str) -> Result<i64, DbError> {
    let query = format!("SELECT count(*) AS count FROM {}", quote_ident(table));
    let row = sqlx::query(&query)
        .fetch_one(pool)
        .await
        .map_err(DbError::catalog("counting table rows"))?;
    Ok(row.get("count"))
}

async fn table_pretty_size(pool: &Pool<Postgres>, table: &str) -> Result<String, DbError> {
    let row = sqlx::query("SELECT pg_size_pretty(pg_total_relation_size($1::regclass)) AS size")
        .bind(quote_ident(table))
        .fetch_one(pool)
        .await
        .map_err(DbError::catalog("measuring table size"))?;
    Ok(row.get("size"))
}

async fn table_last_analyze(
    pool: &Pool<Postgres>,
    table: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let row = sqlx::query(
        "SELECT last_analyze FROM pg_stat_user_tables
         WHERE schemaname = $1 AND relname = $2",
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_optional(pool)
    .await
    .map_err(DbError::catalog("fetching analyze timestamp"))?;

    Ok(row.and_then(|r| r.try_get("last_analyze").ok().flatten()))
}

async fn table_index_count(pool: &Pool<Postgres>, table: &str) -> Result<i64, DbError> {
    let row = sqlx::query(
        "SELECT count(*) AS count FROM pg_indexes
         WHERE schemaname = $1 AND tablename = $2",
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("counting indexes"))?;
    Ok(row.get("count"))
}

async fn table_column_counts(
    pool: &Pool<Postgres>,
    table: &str,
) -> Result<(i64, i64), DbError> {
    let row = sqlx::query(
        "SELECT count(*) AS column_count,
                count(*) FILTER (WHERE is_nullable = 'YES') AS nullable_count
         FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = $2",
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("counting columns"))?;
    Ok((row.get("column_count"), row.get("nullable_count")))
}

async fn table_key_counts(pool: &Pool<Postgres>, table: &str) -> Result<(i64, i64), DbError> {
    let row = sqlx::query(
        "SELECT count(*) FILTER (WHERE constraint_type = 'PRIMARY KEY') AS pk_count,
                count(*) FILTER (WHERE constraint_type = 'FOREIGN KEY') AS fk_count
         FROM information_schema.table_constraints
         WHERE table_schema = $1 AND table_name = $2",
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("counting key constraints"))?;
    Ok((row.get("pk_count"), row.get("fk_count")))
}

// --- Server health ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: String,
    pub uptime: String,
    pub databases: i64,
    pub total_tables: i64,
    pub active_connections: i64,
    pub idle_connections: i64,
    pub waiting_queries: i64,
    pub active_transactions: i64,
    pub size: String,
    pub max_connections: i32,
    pub start_time: String,
    pub server_process_id: i32,
    pub data_directory: String,
    pub config_file: String,
    pub hba_file: String,
    pub ident_file: String,
    pub cache_hit_ratio: String,
    pub transactions_per_sec: i64,
    pub deadlocks: i64,
    pub temp_file_usage: String,
}

pub async fn server_info(pool: &Pool<Postgres>) -> Result<ServerInfo, DbError> {
    let (identity, paths, counts, activity, performance, deadlocks, max_connections) = tokio::try_join!(
        server_identity(pool),
        server_paths(pool),
        object_counts(pool),
        activity_counts(pool),
        server_performance(pool),
        current_deadlocks(pool),
        max_connections_setting(pool),
    )?;

    Ok(ServerInfo {
        version: identity.version,
        uptime: format_uptime(identity.uptime_secs),
        databases: counts.0,
        total_tables: counts.1,
        active_connections: activity.0,
        idle_connections: activity.1,
        waiting_queries: activity.2,
        active_transactions: activity.3,
        size: performance.size,
        max_connections,
        start_time: identity.start_time,
        server_process_id: identity.pid,
        data_directory: paths.0,
        config_file: paths.1,
        hba_file: paths.2,
        ident_file: paths.3,
        cache_hit_ratio: format_percent(performance.cache_hit_ratio, 2),
        transactions_per_sec: performance.tps.unwrap_or(0.0).round() as i64,
        deadlocks,
        temp_file_usage: performance.temp_file_usage,
    })
}

struct ServerIdentity {
    version: String,
    uptime_secs: i64,
    start_time: String,
    pid: i32,
}

async fn server_identity(pool: &Pool<Postgres>) -> Result<ServerIdentity, DbError> {
    let row = sqlx::query(
        "SELECT version() AS version,
                EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time()))::bigint AS uptime,
                pg_postmaster_start_time()::text AS start_time,
                pg_backend_pid() AS pid",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching server identity"))?;

    Ok(ServerIdentity {
        version: row.get("version"),
        uptime_secs: row.get("uptime"),
        start_time: row.get("start_time"),
        pid: row.get("pid"),
    })
}

async fn server_paths(
    pool: &Pool<Postgres>,
) -> Result<(String, String, String, String), DbError> {
    let row = sqlx::query(
        "SELECT current_setting('data_directory') AS data_directory,
                current_setting('config_file') AS config_file,
                current_setting('hba_file') AS hba_file,
                current_setting('ident_file') AS ident_file",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching configuration paths"))?;

    Ok((
        row.get("data_directory"),
        row.get("config_file"),
        row.get("hba_file"),
        row.get("ident_file"),
    ))
}

async fn object_counts(pool: &Pool<Postgres>) -> Result<(i64, i64), DbError> {
    let row = sqlx::query(
        "SELECT (SELECT count(*) FROM pg_database WHERE datistemplate = false) AS databases,
                (SELECT count(*) FROM information_schema.tables
                 WHERE table_schema = $1) AS tables",
    )
    .bind(SCHEMA)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("counting databases and tables"))?;

    Ok((row.get("databases"), row.get("tables")))
}

async fn activity_counts(pool: &Pool<Postgres>) -> Result<(i64, i64, i64, i64), DbError> {
    let row = sqlx::query(
        "SELECT count(*) FILTER (WHERE state = 'active') AS active,
                count(*) FILTER (WHERE state = 'idle') AS idle,
                count(*) FILTER (WHERE wait_event_type IS NOT NULL) AS waiting,
                count(*) FILTER (WHERE state = 'active' AND xact_start IS NOT NULL) AS active_transactions
         FROM pg_stat_activity",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("counting connections"))?;

    Ok((
        row.get("active"),
        row.get("idle"),
        row.get("waiting"),
        row.get("active_transactions"),
    ))
}

struct ServerPerformance {
    cache_hit_ratio: Option<f64>,
    tps: Option<f64>,
    temp_file_usage: String,
    size: String,
}

async fn server_performance(pool: &Pool<Postgres>) -> Result<ServerPerformance, DbError> {
    let row = sqlx::query(
        "SELECT (100.0 * sum(blks_hit) / nullif(sum(blks_hit) + sum(blks_read), 0))::float8 AS cache_hit_ratio,
                (sum(xact_commit + xact_rollback)
                 / nullif(EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time())), 0))::float8 AS tps,
                pg_size_pretty(COALESCE(sum(temp_bytes), 0)::bigint) AS temp_file_usage,
                pg_size_pretty(COALESCE(sum(pg_database_size(datname)), 0)::bigint) AS size
         FROM pg_stat_database",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching server statistics"))?;

    Ok(ServerPerformance {
        cache_hit_ratio: row.try_get("cache_hit_ratio").ok().flatten(),
        tps: row.try_get("tps").ok().flatten(),
        temp_file_usage: row.get("temp_file_usage"),
        size: row.get("size"),
    })
}

async fn current_deadlocks(pool: &Pool<Postgres>) -> Result<i64, DbError> {
    let row = sqlx::query(
        "SELECT COALESCE(sum(deadlocks), 0)::bigint AS deadlocks
         FROM pg_stat_database WHERE datname = current_database()",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching deadlock count"))?;

    Ok(row.get("deadlocks"))
}

async fn max_connections_setting(pool: &Pool<Postgres>) -> Result<i32, DbError> {
    let row = sqlx::query("SELECT current_setting('max_connections')::int AS max_connections")
        .fetch_one(pool)
        .await
        .map_err(DbError::catalog("fetching max_connections"))?;

    Ok(row.get("max_connections"))
}

// --- Database health ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub table_count: i64,
    pub size: String,
    pub owner: String,
    pub encoding: String,
    pub collation: String,
    pub ctype: String,
    pub tablespace_location: String,
    pub last_vacuum: String,
    pub last_analyze: String,
    pub cache_hit_ratio: String,
    pub index_usage: String,
    pub deadlocks: i64,
    pub conflict_rate: String,
    pub bloat_percentage: f64,
    pub frozen_xid_age: i64,
    pub extensions: Vec<String>,
    pub maintenance_status: MaintenanceStatus,
    pub days_since_maintenance: Option<i64>,
}

pub async fn database_info(pool: &Pool<Postgres>) -> Result<DatabaseInfo, DbError> {
    let (basics, table_count, timestamps, perf, index_usage, extensions, bloat_stats) = tokio::try_join!(
        database_basics(pool),
        table_count(pool),
        maintenance_timestamps(pool),
        database_performance(pool),
        index_usage_ratio(pool),
        installed_extensions(pool),
        health::table_bloat_stats(pool),
    )?;

    let now = Utc::now();
    let (last_vacuum, last_analyze) = timestamps;
    let status = health::classify_maintenance(last_vacuum, last_analyze, now);
    let days_since = health::days_since_maintenance(last_vacuum, last_analyze, now);

    let ratios: Vec<f64> = bloat_stats
        .iter()
        .filter_map(|t| t.bloat_ratio)
        .filter(|r| *r > 0.0)
        .collect();
    let bloat_percentage = if ratios.is_empty() {
        0.0
    } else {
        (ratios.iter().sum::<f64>() / ratios.len() as f64 * 100.0).round() / 100.0
    };

    Ok(DatabaseInfo {
        name: basics.name,
        table_count,
        size: basics.size,
        owner: basics.owner,
        encoding: basics.encoding,
        collation: basics.collation,
        ctype: basics.ctype,
        tablespace_location: basics.tablespace,
        last_vacuum: format_maintenance_date(last_vacuum),
        last_analyze: format_maintenance_date(last_analyze),
        cache_hit_ratio: format_percent(perf.cache_hit_ratio, 2),
        index_usage: format_percent(index_usage, 2),
        deadlocks: perf.deadlocks,
        conflict_rate: perf
            .conflict_rate
            .map(|v| format!("{:.4}%", v))
            .unwrap_or_else(|| "0%".to_string()),
        bloat_percentage,
        frozen_xid_age: basics.frozen_xid_age as i64,
        extensions,
        maintenance_status: status,
        days_since_maintenance: days_since,
    })
}

struct DatabaseBasics {
    name: String,
    size: String,
    owner: String,
    encoding: String,
    collation: String,
    ctype: String,
    tablespace: String,
    frozen_xid_age: i32,
}

async fn database_basics(pool: &Pool<Postgres>) -> Result<DatabaseBasics, DbError> {
    let row = sqlx::query(
        "SELECT current_database() AS name,
                pg_size_pretty(pg_database_size(current_database())) AS size,
                pg_get_userbyid(d.datdba)::text AS owner,
                current_setting('server_encoding') AS encoding,
                d.datcollate AS collation,
                d.datctype AS ctype,
                t.spcname::text AS tablespace,
                age(d.datfrozenxid) AS frozen_xid_age
         FROM pg_database d
         JOIN pg_tablespace t ON d.dattablespace = t.oid
         WHERE d.datname = current_database()",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching database properties"))?;

    Ok(DatabaseBasics {
        name: row.get("name"),
        size: row.get("size"),
        owner: row.get("owner"),
        encoding: row.get("encoding"),
        collation: row.get("collation"),
        ctype: row.get("ctype"),
        tablespace: row.get("tablespace"),
        frozen_xid_age: row.get("frozen_xid_age"),
    })
}

async fn table_count(pool: &Pool<Postgres>) -> Result<i64, DbError> {
    let row = sqlx::query(
        "SELECT count(*) AS tables FROM information_schema.tables WHERE table_schema = $1",
    )
    .bind(SCHEMA)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("counting tables"))?;

    Ok(row.get("tables"))
}

async fn maintenance_timestamps(
    pool: &Pool<Postgres>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), DbError> {
    let row = sqlx::query(
        "SELECT max(last_vacuum) AS last_vacuum, max(last_analyze) AS last_analyze
         FROM pg_stat_all_tables WHERE schemaname = $1",
    )
    .bind(SCHEMA)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching vacuum/analyze timestamps"))?;

    Ok((
        row.try_get("last_vacuum").ok().flatten(),
        row.try_get("last_analyze").ok().flatten(),
    ))
}

struct DatabasePerformance {
    cache_hit_ratio: Option<f64>,
    conflict_rate: Option<f64>,
    deadlocks: i64,
}

async fn database_performance(pool: &Pool<Postgres>) -> Result<DatabasePerformance, DbError> {
    let row = sqlx::query(
        "SELECT (100.0 * sum(blks_hit) / nullif(sum(blks_hit) + sum(blks_read), 0))::float8 AS cache_hit_ratio,
                (100.0 * sum(conflicts)
                 / nullif(sum(conflicts) + sum(xact_commit) + sum(xact_rollback), 0))::float8 AS conflict_rate,
                COALESCE(sum(deadlocks), 0)::bigint AS deadlocks
         FROM pg_stat_database WHERE datname = current_database()",
    )
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching database statistics"))?;

    Ok(DatabasePerformance {
        cache_hit_ratio: row.try_get("cache_hit_ratio").ok().flatten(),
        conflict_rate: row.try_get("conflict_rate").ok().flatten(),
        deadlocks: row.get("deadlocks"),
    })
}

async fn index_usage_ratio(pool: &Pool<Postgres>) -> Result<Option<f64>, DbError> {
    let row = sqlx::query(
        "SELECT (100.0 * sum(idx_scan) / nullif(sum(idx_scan) + sum(seq_scan), 0))::float8 AS index_usage
         FROM pg_stat_all_tables WHERE schemaname = $1",
    )
    .bind(SCHEMA)
    .fetch_one(pool)
    .await
    .map_err(DbError::catalog("fetching index usage"))?;

    Ok(row.try_get("index_usage").ok().flatten())
}

async fn installed_extensions(pool: &Pool<Postgres>) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query("SELECT extname FROM pg_extension ORDER BY extname")
        .fetch_all(pool)
        .await
        .map_err(DbError::catalog("listing extensions"))?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("extname"))
        .collect())
}

fn format_maintenance_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

fn format_percent(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}%", decimals, v),
        None => "N/A".to_string(),
    }
}

fn format_uptime(seconds: i64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{} days, {} hours", days, hours)
    } else if hours > 0 {
        format!("{} hours, {} minutes", hours, minutes)
    } else {
        format!("{} minutes, {} seconds", minutes, secs)
    }
}
