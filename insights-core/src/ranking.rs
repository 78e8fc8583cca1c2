//! Ranked, paginated retrieval
//!
//! Every top-N query goes through [`rank`]: it over-fetches one row past the
//! page to learn whether another page exists, so no separate count query is
//! needed, and it re-applies the ranking order so ties always come back in
//! the same sequence.

use crate::error::Result;
use crate::types::{
    InsightsQueryOptions, NewTeamMember, RankedPage, TopChannel, TopReaction, TopThread,
};
use std::cmp::Ordering;

/// An item that can be ranked: higher score first, ties broken by id ascending.
pub trait Ranked {
    /// Stable identifier used as the tie-break.
    fn rank_id(&self) -> &str;

    /// Primary ranking key; larger values rank higher.
    fn rank_score(&self) -> i64;

    /// Total ranking order: `(score desc, id asc)`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .rank_score()
            .cmp(&self.rank_score())
            .then_with(|| self.rank_id().cmp(other.rank_id()))
    }
}

impl Ranked for TopReaction {
    fn rank_id(&self) -> &str {
        &self.emoji_name
    }

    fn rank_score(&self) -> i64 {
        self.count
    }
}

impl Ranked for TopChannel {
    fn rank_id(&self) -> &str {
        &self.id
    }

    fn rank_score(&self) -> i64 {
        self.message_count
    }
}

impl Ranked for TopThread {
    fn rank_id(&self) -> &str {
        &self.post_id
    }

    fn rank_score(&self) -> i64 {
        self.reply_count
    }
}

/// Newest members first.
impl Ranked for NewTeamMember {
    fn rank_id(&self) -> &str {
        &self.id
    }

    fn rank_score(&self) -> i64 {
        self.joined_at.timestamp_millis()
    }
}

/// Fetch one page of ranked rows.
///
/// `fetch` receives `(offset, limit)` and must return rows in ranking order;
/// `limit` is always `per_page + 1`.
pub fn rank<T, F>(opts: &InsightsQueryOptions, fetch: F) -> Result<RankedPage<T>>
where
    T: Ranked,
    F: FnOnce(u64, u64) -> Result<Vec<T>>,
{
    let per_page = opts.per_page() as usize;
    let mut rows = fetch(opts.offset(), opts.fetch_limit())?;

    rows.sort_by(T::rank_cmp);
    let has_next = rows.len() > per_page;
    rows.truncate(per_page);

    Ok(RankedPage {
        items: rows,
        has_next,
    })
}
