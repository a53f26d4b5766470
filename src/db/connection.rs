use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

use crate::error::DbError;

/// Database every PostgreSQL cluster carries; used when a request must work
/// without naming a database (enumerating databases, test before selection).
pub const ADMIN_DATABASE: &str = "postgres";

const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection descriptor supplied with every request. Never persisted
/// server-side; the browser owns its own list of named descriptors.
#[derive(Deserialize, Clone, Debug)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

/// Which database a session should land in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetDatabase {
    /// The database named in the descriptor (cluster default when empty).
    Descriptor,
    /// The fixed administrative database, regardless of the descriptor.
    AdminDefault,
}

/// One short-lived connection scope. Opened per request, closed on every
/// exit path; nothing is shared or reused across requests.
pub struct Session {
    pool: Pool<Postgres>,
}

impl Session {
    pub async fn open(
        config: &ConnectionConfig,
        target: TargetDatabase,
    ) -> Result<Session, DbError> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username);

        if let Some(pwd) = &config.password {
            options = options.password(pwd);
        }

        let database = match target {
            TargetDatabase::AdminDefault => Some(ADMIN_DATABASE.to_string()),
            TargetDatabase::Descriptor => {
                config.database.clone().filter(|db| !db.is_empty())
            }
        };
        if let Some(db) = &database {
            options = options.database(db);
        }

        // A tiny per-request pool rather than a single connection, so the
        // health reports can fan out their sub-queries.
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("connection refused") {
                    return DbError::Connection(format!(
                        "connection refused: is PostgreSQL running on {}:{}?",
                        config.host, config.port
                    ));
                }
                if msg.contains("timed out") || msg.contains("pool timed out") {
                    return DbError::Connection(format!(
                        "{}:{} did not respond within {} ms",
                        config.host,
                        config.port,
                        CONNECT_TIMEOUT.as_millis()
                    ));
                }
                DbError::Connection(msg)
            })?;

        Ok(Session { pool })
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Handshake check behind the `testConnection` action.
pub async fn test_connection(pool: &Pool<Postgres>) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| DbError::Connection(format!("handshake query failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(database: Option<&str>) -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: None,
            database: database.map(|d| d.to_string()),
        }
    }

    #[test]
    fn descriptor_target_ignores_empty_database() {
        let cfg = config(Some(""));
        let resolved = cfg.database.clone().filter(|db| !db.is_empty());
        assert!(resolved.is_none());
    }

    #[test]
    fn connection_config_accepts_minimal_json() {
        let cfg: ConnectionConfig = serde_json::from_str(
            r#"{"host": "db.local", "port": 5433, "username": "admin"}"#,
        )
        .unwrap();
        assert_eq!(cfg.host, "db.local");
        assert_eq!(cfg.port, 5433);
        assert!(cfg.password.is_none());
        assert!(cfg.database.is_none());
    }
}
