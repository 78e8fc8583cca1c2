//! Insights queries over the activity store
//!
//! Implements [`ActivitySource`] for [`Database`]. Visibility:
//! - team scope sees the team's open, non-archived channels
//! - user scope sees non-archived channels the user belongs to; with a team
//!   filter, that team's channels plus direct and group messages

use super::repo::{from_millis, to_millis, Database};
use crate::error::Result;
use crate::series::truncate_to_bucket;
use crate::source::{ActivitySource, BucketPostCount, PostCountQuery, SourceResult};
use crate::types::{ChannelType, NewTeamMember, Scope, TopChannel, TopReaction, TopThread};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ToSql};
use std::collections::BTreeMap;

/// Post counts are grouped in SQL into slots of this width before being folded
/// into local buckets. Every UTC offset in use is a multiple of 15 minutes.
const SLOT_MILLIS: i64 = 15 * 60 * 1000;

type SqlParams = Vec<Box<dyn ToSql>>;

/// SQL condition restricting channel alias `c` to what `scope` may see.
fn visible_channels(scope: &Scope, params: &mut SqlParams) -> String {
    match scope {
        Scope::Team { team_id } => {
            params.push(Box::new(team_id.clone()));
            "c.team_id = ? AND c.type = 'O' AND c.delete_at = 0".to_string()
        }
        Scope::User { user_id, team_id } => {
            params.push(Box::new(user_id.clone()));
            let mut sql = String::from(
                "c.delete_at = 0 AND c.id IN \
                 (SELECT channel_id FROM channel_members WHERE user_id = ?)",
            );
            if let Some(team_id) = team_id {
                params.push(Box::new(team_id.clone()));
                sql.push_str(" AND (c.team_id = ? OR c.team_id IS NULL)");
            }
            sql
        }
    }
}

fn push_paging(sql: &mut String, params: &mut SqlParams, offset: u64, limit: u64) {
    sql.push_str(" LIMIT ? OFFSET ?");
    params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
    params.push(Box::new(i64::try_from(offset).unwrap_or(i64::MAX)));
}

fn param_refs(params: &SqlParams) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

impl Database {
    // ============================================
    // Ranked queries
    // ============================================

    /// Reactions on visible posts; a user scope counts only the user's own.
    pub fn top_reactions_since(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TopReaction>> {
        let mut params: SqlParams = vec![Box::new(to_millis(since))];
        let mut sql = String::from(
            r#"
            SELECT r.emoji_name, COUNT(*) AS cnt
            FROM reactions r
            JOIN posts p ON p.id = r.post_id
            JOIN channels c ON c.id = p.channel_id
            WHERE r.delete_at = 0 AND p.delete_at = 0 AND r.create_at >= ?
            "#,
        );
        sql.push_str(" AND ");
        sql.push_str(&visible_channels(scope, &mut params));
        if let Some(user_id) = scope.user_id() {
            sql.push_str(" AND r.user_id = ?");
            params.push(Box::new(user_id.to_string()));
        }
        sql.push_str(" GROUP BY r.emoji_name ORDER BY cnt DESC, r.emoji_name ASC");
        push_paging(&mut sql, &mut params, offset, limit);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok(TopReaction {
                    emoji_name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Channels ranked by posts; a user scope counts only the user's posts.
    pub fn top_channels_since(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TopChannel>> {
        let mut params: SqlParams = vec![Box::new(to_millis(since))];
        let mut sql = String::from(
            r#"
            SELECT c.id, c.display_name, c.name, c.type, c.team_id, COUNT(p.id) AS cnt
            FROM posts p
            JOIN channels c ON c.id = p.channel_id
            WHERE p.delete_at = 0 AND p.create_at >= ?
            "#,
        );
        sql.push_str(" AND ");
        sql.push_str(&visible_channels(scope, &mut params));
        if let Some(user_id) = scope.user_id() {
            sql.push_str(" AND p.user_id = ?");
            params.push(Box::new(user_id.to_string()));
        }
        sql.push_str(" GROUP BY c.id ORDER BY cnt DESC, c.id ASC");
        push_paging(&mut sql, &mut params, offset, limit);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                let channel_type: String = row.get(3)?;
                Ok(TopChannel {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    name: row.get(2)?,
                    channel_type: ChannelType::from_storage(&channel_type),
                    team_id: row.get(4)?,
                    message_count: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Thread roots ranked by replies in the window. A user scope keeps
    /// threads the user started or replied to.
    pub fn top_threads_since(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TopThread>> {
        let mut params: SqlParams = vec![Box::new(to_millis(since))];
        let mut sql = String::from(
            r#"
            SELECT root.id, root.channel_id, c.display_name, c.name, root.user_id,
                   root.message, COUNT(reply.id) AS replies
            FROM posts reply
            JOIN posts root ON root.id = reply.root_id
            JOIN channels c ON c.id = root.channel_id
            WHERE reply.delete_at = 0 AND root.delete_at = 0 AND reply.create_at >= ?
            "#,
        );
        sql.push_str(" AND ");
        sql.push_str(&visible_channels(scope, &mut params));
        if let Some(user_id) = scope.user_id() {
            sql.push_str(
                " AND (root.user_id = ? OR EXISTS (SELECT 1 FROM posts mine \
                 WHERE mine.root_id = root.id AND mine.user_id = ? AND mine.delete_at = 0))",
            );
            params.push(Box::new(user_id.to_string()));
            params.push(Box::new(user_id.to_string()));
        }
        sql.push_str(" GROUP BY root.id ORDER BY replies DESC, root.id ASC");
        push_paging(&mut sql, &mut params, offset, limit);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut threads = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok(TopThread {
                    post_id: row.get(0)?,
                    channel_id: row.get(1)?,
                    channel_display_name: row.get(2)?,
                    channel_name: row.get(3)?,
                    user_id: row.get(4)?,
                    message: row.get(5)?,
                    reply_count: row.get(6)?,
                    participants: Vec::new(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for thread in &mut threads {
            thread.participants = thread_participants(&conn, &thread.post_id)?;
        }

        Ok(threads)
    }

    // ============================================
    // Post counts
    // ============================================

    /// Post counts per channel folded into the query's local buckets.
    pub fn post_counts_since(&self, query: &PostCountQuery<'_>) -> Result<Vec<BucketPostCount>> {
        if query.channel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; query.channel_ids.len()].join(", ");
        let mut sql = format!(
            r#"
            SELECT channel_id, (create_at / {slot}) * {slot} AS slot, COUNT(*)
            FROM posts
            WHERE delete_at = 0 AND create_at >= ? AND channel_id IN ({placeholders})
            "#,
            slot = SLOT_MILLIS,
            placeholders = placeholders,
        );
        let mut params: SqlParams = vec![Box::new(to_millis(query.since))];
        for id in query.channel_ids {
            params.push(Box::new(id.clone()));
        }
        if let Some(user_id) = query.user_id {
            sql.push_str(" AND user_id = ?");
            params.push(Box::new(user_id.to_string()));
        }
        sql.push_str(" GROUP BY channel_id, slot");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let slots = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut buckets: BTreeMap<(String, DateTime<Utc>), i64> = BTreeMap::new();
        for (channel_id, slot, count) in slots {
            let bucket =
                truncate_to_bucket(from_millis(slot), query.granularity, &query.timezone);
            *buckets.entry((channel_id, bucket)).or_insert(0) += count;
        }

        Ok(buckets
            .into_iter()
            .map(|((channel_id, bucket_start), count)| BucketPostCount {
                channel_id,
                bucket_start,
                count,
            })
            .collect())
    }

    // ============================================
    // New team members
    // ============================================

    /// Active, non-bot members who joined since `since`, newest first.
    pub fn new_team_members_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NewTeamMember>> {
        let mut params: SqlParams =
            vec![Box::new(team_id.to_string()), Box::new(to_millis(since))];
        let mut sql = String::from(
            r#"
            SELECT u.id, u.username, u.first_name, u.last_name, u.nickname, u.position,
                   tm.create_at
            FROM team_members tm
            JOIN users u ON u.id = tm.user_id
            WHERE tm.team_id = ? AND tm.create_at >= ? AND tm.delete_at = 0
              AND u.delete_at = 0 AND u.is_bot = 0
            ORDER BY tm.create_at DESC, u.id ASC
            "#,
        );
        push_paging(&mut sql, &mut params, offset, limit);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok(NewTeamMember {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    nickname: row.get(4)?,
                    position: row.get(5)?,
                    joined_at: from_millis(row.get(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn count_new_team_members_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM team_members tm
            JOIN users u ON u.id = tm.user_id
            WHERE tm.team_id = ?1 AND tm.create_at >= ?2 AND tm.delete_at = 0
              AND u.delete_at = 0 AND u.is_bot = 0
            "#,
            rusqlite::params![team_id, to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Distinct users who replied in a thread, sorted by id.
fn thread_participants(conn: &Connection, root_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT user_id FROM posts WHERE root_id = ? AND delete_at = 0 ORDER BY user_id",
    )?;
    let participants = stmt
        .query_map([root_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(participants)
}

impl ActivitySource for Database {
    fn top_reactions(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<TopReaction>> {
        Ok(self.top_reactions_since(scope, since, offset, limit)?)
    }

    fn top_channels(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<TopChannel>> {
        Ok(self.top_channels_since(scope, since, offset, limit)?)
    }

    fn top_threads(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<TopThread>> {
        Ok(self.top_threads_since(scope, since, offset, limit)?)
    }

    fn post_counts_by_bucket(
        &self,
        query: &PostCountQuery<'_>,
    ) -> SourceResult<Vec<BucketPostCount>> {
        Ok(self.post_counts_since(query)?)
    }

    fn new_team_members(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<NewTeamMember>> {
        Ok(self.new_team_members_since(team_id, since, offset, limit)?)
    }

    fn count_new_team_members(&self, team_id: &str, since: DateTime<Utc>) -> SourceResult<i64> {
        Ok(self.count_new_team_members_since(team_id, since)?)
    }
}
