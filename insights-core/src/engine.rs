//! Insights engine
//!
//! Stateless facade over an [`ActivitySource`]. Each query validates its
//! inputs, asks the source for one page of ranked rows and shapes the result.
//! Source failures are wrapped with the failing operation and returned as is;
//! a query either fully succeeds or returns an error.

use crate::error::{Error, Result};
use crate::ranking::rank;
use crate::series::{self, BucketCount, ChannelPostCountSeries, SeriesRequest};
use crate::source::ActivitySource;
use crate::types::{
    validate_id, InsightsQueryOptions, NewTeamMembersResult, RankedPage, Scope, TopChannel,
    TopReaction, TopThread,
};
use crate::window::ResolvedWindow;
use serde::Serialize;

/// Top channels plus a post-count series for each returned channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopChannelList {
    #[serde(flatten)]
    pub items: RankedPage<TopChannel>,
    pub post_count_by_duration: ChannelPostCountSeries,
}

impl TopChannelList {
    /// Iterate `(rank, channel, series)` with 1-based ranks within the page.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &TopChannel, &[BucketCount])> {
        self.items.items.iter().enumerate().map(|(i, channel)| {
            let counts = self.post_count_by_duration.get(&channel.id).unwrap_or(&[]);
            (i + 1, channel, counts)
        })
    }
}

/// Runs insights queries against an activity source.
#[derive(Debug, Clone)]
pub struct InsightsEngine<S> {
    source: S,
}

impl<S: ActivitySource> InsightsEngine<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Emoji reactions ranked by use since the window start.
    pub fn top_reactions(
        &self,
        scope: &Scope,
        opts: &InsightsQueryOptions,
    ) -> Result<RankedPage<TopReaction>> {
        scope.validate()?;
        log_query("top_reactions", scope, opts);

        rank(opts, |offset, limit| {
            self.source
                .top_reactions(scope, opts.start(), offset, limit)
                .map_err(|e| Error::data_source("top_reactions", e))
        })
    }

    /// Channels ranked by posts since the window start, with a post-count
    /// series for each channel on the page.
    ///
    /// A user scope restricts the series to that user's own posts. `opts`
    /// must come from `window`; a different start is `InvalidRange`.
    ///
    /// `message_count` covers every post from the window start on, while the
    /// series stops at the bucket containing `window.now`, so posts stamped
    /// after `now` show up in the count only.
    pub fn top_channels(
        &self,
        scope: &Scope,
        window: &ResolvedWindow,
        opts: &InsightsQueryOptions,
    ) -> Result<TopChannelList> {
        scope.validate()?;
        if opts.start_unix_millis() != window.start_unix_millis() {
            return Err(Error::InvalidRange(format!(
                "query options start at {} but the {:?} window starts at {}",
                opts.start_unix_millis(),
                window.range,
                window.start_unix_millis()
            )));
        }
        log_query("top_channels", scope, opts);

        let items = rank(opts, |offset, limit| {
            self.source
                .top_channels(scope, opts.start(), offset, limit)
                .map_err(|e| Error::data_source("top_channels", e))
        })?;

        let channel_ids: Vec<String> = items.items.iter().map(|c| c.id.clone()).collect();
        let request = SeriesRequest::for_window(window, &channel_ids).for_user(scope.user_id());
        let post_count_by_duration = series::build(&self.source, &request)?;

        Ok(TopChannelList {
            items,
            post_count_by_duration,
        })
    }

    /// Threads ranked by replies since the window start.
    pub fn top_threads(
        &self,
        scope: &Scope,
        opts: &InsightsQueryOptions,
    ) -> Result<RankedPage<TopThread>> {
        scope.validate()?;
        log_query("top_threads", scope, opts);

        rank(opts, |offset, limit| {
            self.source
                .top_threads(scope, opts.start(), offset, limit)
                .map_err(|e| Error::data_source("top_threads", e))
        })
    }

    /// Members who joined the team since the window start, newest first,
    /// with the total number of such members.
    pub fn new_team_members(
        &self,
        team_id: &str,
        opts: &InsightsQueryOptions,
    ) -> Result<NewTeamMembersResult> {
        validate_id("team_id", team_id)?;
        tracing::debug!(
            query = "new_team_members",
            team_id = %team_id,
            start = opts.start_unix_millis(),
            page = opts.page(),
            per_page = opts.per_page(),
            "Running insights query"
        );

        let page = rank(opts, |offset, limit| {
            self.source
                .new_team_members(team_id, opts.start(), offset, limit)
                .map_err(|e| Error::data_source("new_team_members", e))
        })?;

        let total_count = self
            .source
            .count_new_team_members(team_id, opts.start())
            .map_err(|e| Error::data_source("count_new_team_members", e))?;

        Ok(NewTeamMembersResult {
            items: page.items,
            has_next: page.has_next,
            total_count,
        })
    }
}

fn log_query(query: &'static str, scope: &Scope, opts: &InsightsQueryOptions) {
    tracing::debug!(
        query,
        scope = %scope,
        start = opts.start_unix_millis(),
        page = opts.page(),
        per_page = opts.per_page(),
        "Running insights query"
    );
}
