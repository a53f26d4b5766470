// =====================================================
// MAINTENANCE PLANNER
// Plans from health samples, executes strictly in order:
// vacuum-analyze sweep, full rewrites, reindex, analyze
// =====================================================

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::db::catalog;
use crate::db::health::{self, TableHealthSample};
use crate::db::sql_utils::quote_ident;
use crate::error::DbError;

/// Sentinel table name meaning "every table in the schema".
pub const ALL_TABLES: &str = "ALL";

/// What a maintenance pass will do, decided up front from one set of health
/// samples. A table lands in exactly one of the two lists; the light sweep
/// at execution time covers the union of both.
#[derive(Default, Debug)]
pub struct MaintenancePlan {
    pub light_pass: Vec<String>,
    pub full_rewrite: Vec<String>,
    pub indexes_to_rebuild: Vec<String>,
}

impl MaintenancePlan {
    pub fn tables_processed(&self) -> usize {
        self.light_pass.len() + self.full_rewrite.len()
    }

    /// Every planned table, light and full alike.
    pub fn light_sweep(&self) -> impl Iterator<Item = &String> {
        self.light_pass.iter().chain(self.full_rewrite.iter())
    }
}

/// Plans over the discovered table list, joining health samples onto it.
/// A discovered table without a sample (no statistics row yet, partitioned
/// parents) still gets the light pass.
pub fn build_plan(tables: &[String], samples: &[TableHealthSample]) -> MaintenancePlan {
    let by_name: HashMap<&str, &TableHealthSample> = samples
        .iter()
        .map(|sample| (sample.table_name.as_str(), sample))
        .collect();

    let mut plan = MaintenancePlan::default();
    for table in tables {
        let bloated = by_name
            .get(table.as_str())
            .map(|sample| sample.is_bloated())
            .unwrap_or(false);
        if bloated {
            plan.full_rewrite.push(table.clone());
        } else {
            plan.light_pass.push(table.clone());
        }
    }
    for sample in samples {
        plan.indexes_to_rebuild
            .extend(sample.unused_indexes.iter().cloned());
    }
    plan
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceResult {
    pub tables_processed: usize,
    pub bloated_tables_fixed: usize,
    pub indexes_rebuilt: usize,
}

#[derive(Serialize, Debug)]
pub struct MaintenanceOutcome {
    pub success: bool,
    pub details: MaintenanceResult,
}

/// One-shot maintenance pass over the whole schema. Discovery completes
/// before the first mutating statement; statements run sequentially and the
/// pass aborts on the first failure, leaving completed work in place.
pub async fn run_magic_maintenance(
    pool: &Pool<Postgres>,
) -> Result<MaintenanceOutcome, DbError> {
    let tables = catalog::list_tables(pool).await?;
    log::info!("maintenance discovery found {} tables", tables.len());

    let samples = health::collect_health_samples(pool).await?;
    let plan = build_plan(&tables, &samples);
    log::info!(
        "maintenance plan: {} light, {} full rewrites, {} index rebuilds",
        plan.light_pass.len(),
        plan.full_rewrite.len(),
        plan.indexes_to_rebuild.len()
    );

    for table in plan.light_sweep() {
        log::info!("running VACUUM ANALYZE on {}", table);
        let sql = format!("VACUUM ANALYZE {}", quote_ident(table));
        run_stage(pool, &sql, "vacuum analyze", table).await?;
    }

    for table in &plan.full_rewrite {
        log::info!("running VACUUM FULL on bloated table {}", table);
        let sql = format!("VACUUM FULL {}", quote_ident(table));
        run_stage(pool, &sql, "vacuum full", table).await?;
    }

    for index in &plan.indexes_to_rebuild {
        log::info!("rebuilding unused index {}", index);
        let sql = format!("REINDEX INDEX {}", quote_ident(index));
        run_stage(pool, &sql, "reindex", index).await?;
    }

    log::info!("running database-wide ANALYZE");
    run_stage(pool, "ANALYZE", "analyze", "database").await?;

    Ok(MaintenanceOutcome {
        success: true,
        details: MaintenanceResult {
            tables_processed: plan.tables_processed(),
            bloated_tables_fixed: plan.full_rewrite.len(),
            indexes_rebuilt: plan.indexes_to_rebuild.len(),
        },
    })
}

#[derive(Serialize, Debug)]
pub struct VacuumResult {
    pub success: bool,
}

/// Explicit `VACUUM FULL`, either of one named table or of every table in
/// the schema when given the `ALL` sentinel. Ends with a database-wide
/// `ANALYZE` so planner statistics reflect the rewrite.
pub async fn run_vacuum_full(
    pool: &Pool<Postgres>,
    table_name: &str,
) -> Result<VacuumResult, DbError> {
    if table_name == ALL_TABLES {
        for table in catalog::list_tables(pool).await? {
            log::info!("running VACUUM FULL on {}", table);
            let sql = format!("VACUUM FULL {}", quote_ident(&table));
            run_stage(pool, &sql, "vacuum full", &table).await?;
        }
    } else {
        catalog::ensure_known_table(pool, table_name).await?;
        log::info!("running VACUUM FULL on {}", table_name);
        let sql = format!("VACUUM FULL {}", quote_ident(table_name));
        run_stage(pool, &sql, "vacuum full", table_name).await?;
    }

    run_stage(pool, "ANALYZE", "analyze", "database").await?;
    Ok(VacuumResult { success: true })
}

async fn run_stage(
    pool: &Pool<Postgres>,
    sql: &str,
    stage: &'static str,
    object: &str,
) -> Result<(), DbError> {
    sqlx::query(sql)
        .execute(pool)
        .await
        .map_err(|cause| DbError::Planning {
            stage,
            object: object.to_string(),
            cause,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests;
