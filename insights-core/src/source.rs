//! Activity data-source contract
//!
//! The engine never talks to storage directly. Hosts hand it an
//! [`ActivitySource`], which answers ranked-count, bucketed post-count and
//! new-member queries. Visibility rules (which channels a scope may see) are
//! the source's responsibility; the engine only forwards the scope.
//!
//! [`crate::db::Database`] is the SQLite-backed implementation shipped with
//! this crate.

use crate::error::SourceError;
use crate::types::{NewTeamMember, Scope, TopChannel, TopReaction, TopThread};
use crate::window::Granularity;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Result type returned by data-source implementations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Parameters for one batched post-count query.
#[derive(Debug, Clone)]
pub struct PostCountQuery<'a> {
    /// Channels to count; never empty when issued by the engine
    pub channel_ids: &'a [String],
    /// Only posts created at or after this instant are counted
    pub since: DateTime<Utc>,
    /// Bucket width
    pub granularity: Granularity,
    /// Timezone whose calendar defines bucket boundaries
    pub timezone: Tz,
    /// When set, only posts authored by this user are counted
    pub user_id: Option<&'a str>,
}

/// Raw post count for one channel in one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPostCount {
    pub channel_id: String,
    /// Start of the bucket, already truncated to the requested granularity
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
}

/// Read-only queries the insights engine needs from an activity store.
///
/// Ranked queries return at most `limit` rows after skipping `offset`, ordered
/// by the item's ranking order (count descending, id ascending; new members by
/// join time descending, id ascending).
pub trait ActivitySource {
    /// Emoji usage counts for reactions created since `since`.
    fn top_reactions(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<TopReaction>>;

    /// Channels ranked by posts created since `since`.
    fn top_channels(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<TopChannel>>;

    /// Thread roots ranked by replies created since `since`.
    fn top_threads(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<TopThread>>;

    /// Post counts grouped by channel and bucket, in one query.
    fn post_counts_by_bucket(
        &self,
        query: &PostCountQuery<'_>,
    ) -> SourceResult<Vec<BucketPostCount>>;

    /// Members who joined `team_id` since `since`, newest first.
    fn new_team_members(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> SourceResult<Vec<NewTeamMember>>;

    /// Number of members who joined `team_id` since `since`.
    fn count_new_team_members(&self, team_id: &str, since: DateTime<Utc>) -> SourceResult<i64>;
}

macro_rules! forward_activity_source {
    ($($ty:ty),*) => {
        $(
            impl<S: ActivitySource + ?Sized> ActivitySource for $ty {
                fn top_reactions(
                    &self,
                    scope: &Scope,
                    since: DateTime<Utc>,
                    offset: u64,
                    limit: u64,
                ) -> SourceResult<Vec<TopReaction>> {
                    (**self).top_reactions(scope, since, offset, limit)
                }

                fn top_channels(
                    &self,
                    scope: &Scope,
                    since: DateTime<Utc>,
                    offset: u64,
                    limit: u64,
                ) -> SourceResult<Vec<TopChannel>> {
                    (**self).top_channels(scope, since, offset, limit)
                }

                fn top_threads(
                    &self,
                    scope: &Scope,
                    since: DateTime<Utc>,
                    offset: u64,
                    limit: u64,
                ) -> SourceResult<Vec<TopThread>> {
                    (**self).top_threads(scope, since, offset, limit)
                }

                fn post_counts_by_bucket(
                    &self,
                    query: &PostCountQuery<'_>,
                ) -> SourceResult<Vec<BucketPostCount>> {
                    (**self).post_counts_by_bucket(query)
                }

                fn new_team_members(
                    &self,
                    team_id: &str,
                    since: DateTime<Utc>,
                    offset: u64,
                    limit: u64,
                ) -> SourceResult<Vec<NewTeamMember>> {
                    (**self).new_team_members(team_id, since, offset, limit)
                }

                fn count_new_team_members(
                    &self,
                    team_id: &str,
                    since: DateTime<Utc>,
                ) -> SourceResult<i64> {
                    (**self).count_new_team_members(team_id, since)
                }
            }
        )*
    };
}

forward_activity_source!(&S, Box<S>, Arc<S>);
