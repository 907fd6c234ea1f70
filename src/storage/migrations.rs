//! Database migrations for run databases
//!
//! Run by the collector when it creates a run file. The dashboard itself only
//! opens run databases read-only and never migrates them.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per environment step
        CREATE TABLE IF NOT EXISTS steps (
            step INTEGER PRIMARY KEY,
            episode INTEGER NOT NULL,
            reward REAL NOT NULL,
            reward_components TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- One row per finalized episode
        CREATE TABLE IF NOT EXISTS episodes (
            episode INTEGER PRIMARY KEY,
            total_reward REAL NOT NULL,
            length INTEGER NOT NULL,
            hacking_score REAL NOT NULL DEFAULT 0.0,
            hacking_flags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// Per-episode step lookups (v2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_steps_episode ON steps(episode, step);

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )?;

    Ok(())
}
