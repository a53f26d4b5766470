// =====================================================
// HTTP API
// Typed action dispatch plus the grid paging endpoint
// =====================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::{Pool, Postgres};
use tower_http::cors::CorsLayer;

use crate::db::connection::{self, ConnectionConfig, Session, TargetDatabase};
use crate::db::grid::{self, TablePageRequest};
use crate::db::{catalog, maintenance, mutation};
use crate::error::DbError;

pub fn router() -> Router {
    Router::new()
        .route("/api/db", post(handle_db_action))
        .route("/api/table-data", post(handle_table_page))
        .route("/api/table-stats", post(handle_table_stats))
        .layer(CorsLayer::permissive())
}

/// Body of the action endpoint: a connection descriptor plus one action
/// with its own fields, discriminated by the `action` tag.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DbActionRequest {
    pub connection_details: ConnectionConfig,
    #[serde(flatten)]
    pub action: Action,
}

/// Closed set of operations a request can name. Adding a variant here is
/// the only way to expose a new operation.
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    GetDatabases,
    TestConnection,
    GetTables,
    GetTableStructure {
        table_name: String,
    },
    GetTableData {
        table_name: String,
    },
    GetServerInfo,
    GetDatabaseInfo,
    RunVacuumFull {
        table_name: String,
    },
    RunMagicMaintenance,
    InsertRow {
        table_name: String,
        row_data: Map<String, Value>,
    },
    UpdateRow {
        table_name: String,
        row_data: Map<String, Value>,
        primary_key: String,
    },
    DeleteRow {
        table_name: String,
        primary_key: String,
        primary_key_value: Value,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::GetDatabases => "getDatabases",
            Action::TestConnection => "testConnection",
            Action::GetTables => "getTables",
            Action::GetTableStructure { .. } => "getTableStructure",
            Action::GetTableData { .. } => "getTableData",
            Action::GetServerInfo => "getServerInfo",
            Action::GetDatabaseInfo => "getDatabaseInfo",
            Action::RunVacuumFull { .. } => "runVacuumFull",
            Action::RunMagicMaintenance => "runMagicMaintenance",
            Action::InsertRow { .. } => "insertRow",
            Action::UpdateRow { .. } => "updateRow",
            Action::DeleteRow { .. } => "deleteRow",
        }
    }

    /// Database enumeration always lands in the administrative database;
    /// everything else goes where the descriptor points.
    pub fn target(&self) -> TargetDatabase {
        match self {
            Action::GetDatabases => TargetDatabase::AdminDefault,
            _ => TargetDatabase::Descriptor,
        }
    }
}

async fn handle_db_action(
    Json(request): Json<DbActionRequest>,
) -> Result<Response, ApiError> {
    log::info!(
        "action {} against {}:{}",
        request.action.name(),
        request.connection_details.host,
        request.connection_details.port
    );

    let session = Session::open(&request.connection_details, request.action.target()).await?;
    let result = dispatch(session.pool(), &request.action).await;
    session.close().await;
    Ok(result?)
}

async fn dispatch(pool: &Pool<Postgres>, action: &Action) -> Result<Response, DbError> {
    match action {
        Action::GetDatabases => Ok(Json(catalog::list_databases(pool).await?).into_response()),
        Action::TestConnection => {
            connection::test_connection(pool).await?;
            Ok(Json(json!({"success": true})).into_response())
        }
        Action::GetTables => Ok(Json(catalog::list_tables(pool).await?).into_response()),
        Action::GetTableStructure { table_name } => {
            Ok(Json(catalog::table_structure(pool, table_name).await?).into_response())
        }
        Action::GetTableData { table_name } => {
            Ok(Json(catalog::table_data(pool, table_name).await?).into_response())
        }
        Action::GetServerInfo => Ok(Json(catalog::server_info(pool).await?).into_response()),
        Action::GetDatabaseInfo => Ok(Json(catalog::database_info(pool).await?).into_response()),
        Action::RunVacuumFull { table_name } => {
            Ok(Json(maintenance::run_vacuum_full(pool, table_name).await?).into_response())
        }
        Action::RunMagicMaintenance => {
            Ok(Json(maintenance::run_magic_maintenance(pool).await?).into_response())
        }
        Action::InsertRow {
            table_name,
            row_data,
        } => Ok(Json(mutation::insert_row(pool, table_name, row_data).await?).into_response()),
        Action::UpdateRow {
            table_name,
            row_data,
            primary_key,
        } => Ok(
            Json(mutation::update_row(pool, table_name, row_data, primary_key).await?)
                .into_response(),
        ),
        Action::DeleteRow {
            table_name,
            primary_key,
            primary_key_value,
        } => Ok(Json(
            mutation::delete_row(pool, table_name, primary_key, primary_key_value).await?,
        )
        .into_response()),
    }
}

async fn handle_table_page(
    Json(request): Json<TablePageRequest>,
) -> Result<Response, ApiError> {
    log::info!(
        "table page for {} against {}:{}",
        request.table,
        request.connection.host,
        request.connection.port
    );

    let session = Session::open(&request.connection, TargetDatabase::Descriptor).await?;
    let result = grid::fetch_page(session.pool(), &request).await;
    session.close().await;
    Ok(Json(result?).into_response())
}

/// Body of the per-table statistics endpoint.
#[derive(Deserialize, Debug)]
pub struct TableStatsRequest {
    pub connection: ConnectionConfig,
    pub table: String,
}

async fn handle_table_stats(
    Json(request): Json<TableStatsRequest>,
) -> Result<Response, ApiError> {
    log::info!(
        "table stats for {} against {}:{}",
        request.table,
        request.connection.host,
        request.connection.port
    );

    let session = Session::open(&request.connection, TargetDatabase::Descriptor).await?;
    let result = catalog::table_stats(session.pool(), &request.table).await;
    session.close().await;
    Ok(Json(result?).into_response())
}

/// Response-side wrapper: errors leave as `{"error": message}` with a
/// status matching the failure class.
pub struct ApiError(DbError);

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DbError::Validation(_) => StatusCode::BAD_REQUEST,
            DbError::Connection(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::error!("request failed: {}", self.0);
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
