//! Database repository layer
//!
//! Connection handling plus the write operations hosts use to load workspace
//! activity. Read queries for insights live in [`super::queries`].

use crate::error::{Error, Result};
use crate::timezone::UserTimezone;
use crate::types::ChannelType;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

// ============================================
// Records
// ============================================

/// A team row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// A user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub position: String,
    pub is_bot: bool,
    pub timezone: UserTimezone,
    /// Set when the account is deactivated
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// An active human user with only a username.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            nickname: String::new(),
            position: String::new(),
            is_bot: false,
            timezone: UserTimezone::default(),
            deleted_at: None,
        }
    }
}

/// A channel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    /// `None` for direct and group messages
    pub team_id: Option<String>,
    pub name: String,
    pub display_name: String,
    pub channel_type: ChannelType,
    /// Set when the channel is archived
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A post row. Replies carry the id of their thread root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub root_id: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An emoji reaction on a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub user_id: String,
    pub post_id: String,
    pub emoji_name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(crate::window::unix_epoch)
}

fn delete_at(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map_or(0, to_millis)
}

// ============================================
// Database
// ============================================

/// Activity store backed by a single SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        tracing::debug!(path = %path.display(), "Opened activity store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        super::schema::run_migrations(&conn)
    }

    /// Lock the connection. A poisoned lock is reported, not unwrapped.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("connection lock poisoned".to_string()))
    }

    // ============================================
    // Teams and users
    // ============================================

    /// Insert or update a team
    pub fn upsert_team(&self, team: &Team) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO teams (id, name, display_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                display_name = excluded.display_name
            "#,
            params![team.id, team.name, team.display_name],
        )?;
        Ok(())
    }

    /// Insert or update a user
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let timezone = serde_json::to_string(&user.timezone)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (id, username, first_name, last_name, nickname, position,
                               is_bot, timezone, delete_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                nickname = excluded.nickname,
                position = excluded.position,
                is_bot = excluded.is_bot,
                timezone = excluded.timezone,
                delete_at = excluded.delete_at
            "#,
            params![
                user.id,
                user.username,
                user.first_name,
                user.last_name,
                user.nickname,
                user.position,
                user.is_bot,
                timezone,
                delete_at(user.deleted_at),
            ],
        )?;
        Ok(())
    }

    /// Stored timezone preference of a user, `None` for unknown users.
    pub fn user_timezone(&self, user_id: &str) -> Result<Option<UserTimezone>> {
        let conn = self.conn()?;
        let stored: Option<Option<String>> = conn
            .query_row(
                "SELECT timezone FROM users WHERE id = ?",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stored.map(|json| {
            json.and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default()
        }))
    }

    /// Add a user to a team, or re-add a former member with a new join time.
    pub fn add_team_member(
        &self,
        team_id: &str,
        user_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO team_members (team_id, user_id, create_at, delete_at)
            VALUES (?1, ?2, ?3, 0)
            ON CONFLICT(team_id, user_id) DO UPDATE SET
                create_at = excluded.create_at,
                delete_at = 0
            "#,
            params![team_id, user_id, to_millis(joined_at)],
        )?;
        Ok(())
    }

    /// Mark a team membership as ended.
    pub fn remove_team_member(
        &self,
        team_id: &str,
        user_id: &str,
        left_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE team_members SET delete_at = ?3 WHERE team_id = ?1 AND user_id = ?2",
            params![team_id, user_id, to_millis(left_at)],
        )?;
        Ok(())
    }

    // ============================================
    // Channels
    // ============================================

    /// Insert or update a channel
    pub fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO channels (id, team_id, name, display_name, type, delete_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                team_id = excluded.team_id,
                name = excluded.name,
                display_name = excluded.display_name,
                type = excluded.type,
                delete_at = excluded.delete_at
            "#,
            params![
                channel.id,
                channel.team_id,
                channel.name,
                channel.display_name,
                channel.channel_type.as_str(),
                delete_at(channel.deleted_at),
            ],
        )?;
        Ok(())
    }

    pub fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
            params![channel_id, user_id],
        )?;
        Ok(())
    }

    // ============================================
    // Activity
    // ============================================

    /// Insert a post. Re-inserting an id replaces the earlier row.
    pub fn insert_post(&self, post: &Post) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO posts (id, channel_id, user_id, root_id, message,
                                          create_at, delete_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                post.id,
                post.channel_id,
                post.user_id,
                post.root_id.as_deref().unwrap_or(""),
                post.message,
                to_millis(post.created_at),
                delete_at(post.deleted_at),
            ],
        )?;
        Ok(())
    }

    /// Insert many posts in one transaction.
    pub fn insert_posts(&self, posts: &[Post]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO posts (id, channel_id, user_id, root_id, message,
                                              create_at, delete_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for post in posts {
                stmt.execute(params![
                    post.id,
                    post.channel_id,
                    post.user_id,
                    post.root_id.as_deref().unwrap_or(""),
                    post.message,
                    to_millis(post.created_at),
                    delete_at(post.deleted_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert or update a reaction
    pub fn insert_reaction(&self, reaction: &Reaction) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO reactions (user_id, post_id, emoji_name, create_at, delete_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, post_id, emoji_name) DO UPDATE SET
                create_at = excluded.create_at,
                delete_at = excluded.delete_at
            "#,
            params![
                reaction.user_id,
                reaction.post_id,
                reaction.emoji_name,
                to_millis(reaction.created_at),
                delete_at(reaction.deleted_at),
            ],
        )?;
        Ok(())
    }
}
