// =====================================================
// DATABASE CORE MODULE
// Per-request PostgreSQL sessions, catalog inspection,
// health estimation, maintenance and row operations
// =====================================================

pub mod catalog;
pub mod connection;
pub mod grid;
pub mod health;
pub mod maintenance;
pub mod mutation;
pub mod sql_utils;
