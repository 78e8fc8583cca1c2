//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Timestamps are stored as Unix milliseconds; `delete_at = 0` marks a live row.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: workspace entities and activity
    r#"
    -- ============================================
    -- Workspace
    -- ============================================

    CREATE TABLE IF NOT EXISTS teams (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        display_name     TEXT NOT NULL,
        delete_at        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS users (
        id               TEXT PRIMARY KEY,
        username         TEXT NOT NULL UNIQUE,
        first_name       TEXT NOT NULL DEFAULT '',
        last_name        TEXT NOT NULL DEFAULT '',
        nickname         TEXT NOT NULL DEFAULT '',
        position         TEXT NOT NULL DEFAULT '',
        is_bot           INTEGER NOT NULL DEFAULT 0,
        timezone         JSON,
        delete_at        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS team_members (
        team_id          TEXT NOT NULL REFERENCES teams(id),
        user_id          TEXT NOT NULL REFERENCES users(id),
        create_at        INTEGER NOT NULL,
        delete_at        INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (team_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS channels (
        id               TEXT PRIMARY KEY,
        team_id          TEXT REFERENCES teams(id),   -- NULL for direct and group messages
        name             TEXT NOT NULL,
        display_name     TEXT NOT NULL,
        type             TEXT NOT NULL CHECK (type IN ('O', 'P', 'D', 'G')),
        delete_at        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS channel_members (
        channel_id       TEXT NOT NULL REFERENCES channels(id),
        user_id          TEXT NOT NULL REFERENCES users(id),
        PRIMARY KEY (channel_id, user_id)
    );

    -- ============================================
    -- Activity
    -- ============================================

    CREATE TABLE IF NOT EXISTS posts (
        id               TEXT PRIMARY KEY,
        channel_id       TEXT NOT NULL REFERENCES channels(id),
        user_id          TEXT NOT NULL REFERENCES users(id),
        root_id          TEXT NOT NULL DEFAULT '',    -- '' for thread roots
        message          TEXT NOT NULL DEFAULT '',
        create_at        INTEGER NOT NULL,
        delete_at        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS reactions (
        user_id          TEXT NOT NULL REFERENCES users(id),
        post_id          TEXT NOT NULL REFERENCES posts(id),
        emoji_name       TEXT NOT NULL,
        create_at        INTEGER NOT NULL,
        delete_at        INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, post_id, emoji_name)
    );
    "#,
    // Version 2: indexes for windowed aggregates
    r#"
    CREATE INDEX IF NOT EXISTS idx_posts_channel_create ON posts(channel_id, create_at);
    CREATE INDEX IF NOT EXISTS idx_posts_root_create ON posts(root_id, create_at);
    CREATE INDEX IF NOT EXISTS idx_posts_user ON posts(user_id);
    CREATE INDEX IF NOT EXISTS idx_reactions_create ON reactions(create_at);
    CREATE INDEX IF NOT EXISTS idx_team_members_team_create ON team_members(team_id, create_at);
    CREATE INDEX IF NOT EXISTS idx_channel_members_user ON channel_members(user_id);
    CREATE INDEX IF NOT EXISTS idx_channels_team ON channels(team_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(MIGRATIONS.len() as i32, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "teams",
            "users",
            "team_members",
            "channels",
            "channel_members",
            "posts",
            "reactions",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_channel_type_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO channels (id, name, display_name, type) VALUES ('c1', 'c', 'C', 'X')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let fk_tables: Vec<String> = conn
            .prepare("PRAGMA foreign_key_list(posts)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(2))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(fk_tables.iter().any(|t| t == "channels"));
        assert!(fk_tables.iter().any(|t| t == "users"));
    }
}
