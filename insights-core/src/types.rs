//! Core domain types for insights queries
//!
//! Scopes and paging options flow into the engine; ranked items, pages and
//! member listings flow out to the transport layer.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum identifier length accepted in a scope.
pub const MAX_ID_LENGTH: usize = 26;

// ============================================
// Scope
// ============================================

/// Who a query is about: a whole team, or what a single user can see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// All visible activity within a team
    Team { team_id: String },
    /// Activity within channels and threads the user can see, optionally
    /// narrowed to one team
    User {
        user_id: String,
        team_id: Option<String>,
    },
}

impl Scope {
    /// Build a team scope, validating the identifier.
    pub fn team(team_id: impl Into<String>) -> Result<Self> {
        let team_id = team_id.into();
        validate_id("team_id", &team_id)?;
        Ok(Scope::Team { team_id })
    }

    /// Build a user scope. An empty team id means "all teams".
    pub fn user(user_id: impl Into<String>, team_id: Option<String>) -> Result<Self> {
        let user_id = user_id.into();
        validate_id("user_id", &user_id)?;

        let team_id = team_id.filter(|t| !t.is_empty());
        if let Some(team_id) = &team_id {
            validate_id("team_id", team_id)?;
        }

        Ok(Scope::User { user_id, team_id })
    }

    /// Team the scope is narrowed to, if any.
    pub fn team_id(&self) -> Option<&str> {
        match self {
            Scope::Team { team_id } => Some(team_id),
            Scope::User { team_id, .. } => team_id.as_deref(),
        }
    }

    /// User the scope belongs to, if it is a user scope.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Scope::Team { .. } => None,
            Scope::User { user_id, .. } => Some(user_id),
        }
    }

    /// Re-check identifiers of a scope that was constructed directly.
    pub fn validate(&self) -> Result<()> {
        match self {
            Scope::Team { team_id } => validate_id("team_id", team_id),
            Scope::User { user_id, team_id } => {
                validate_id("user_id", user_id)?;
                match team_id {
                    Some(team_id) => validate_id("team_id", team_id),
                    None => Ok(()),
                }
            }
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Team { team_id } => write!(f, "team:{}", team_id),
            Scope::User {
                user_id,
                team_id: Some(team_id),
            } => write!(f, "user:{}@{}", user_id, team_id),
            Scope::User {
                user_id,
                team_id: None,
            } => write!(f, "user:{}", user_id),
        }
    }
}

/// Check an entity identifier: 1 to 26 lowercase ASCII letters or digits.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LENGTH
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

pub(crate) fn validate_id(field: &str, id: &str) -> Result<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(Error::InvalidScope(format!("{} {:?} is not a valid id", field, id)))
    }
}

// ============================================
// Query options
// ============================================

/// Paging and window start for a single insights query.
///
/// Built once per request and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsightsQueryOptions {
    start_unix_millis: i64,
    page: u32,
    per_page: u32,
}

impl InsightsQueryOptions {
    /// Create options, rejecting an empty page size.
    pub fn new(start_unix_millis: i64, page: u32, per_page: u32) -> Result<Self> {
        if per_page == 0 {
            return Err(Error::InvalidPagination(
                "per_page must be greater than zero".to_string(),
            ));
        }
        if (page as u64) * (per_page as u64) > i64::MAX as u64 {
            return Err(Error::InvalidPagination(format!(
                "page {} with per_page {} overflows the offset",
                page, per_page
            )));
        }
        Ok(Self {
            start_unix_millis,
            page,
            per_page,
        })
    }

    pub fn start_unix_millis(&self) -> i64 {
        self.start_unix_millis
    }

    /// Window start as a UTC instant. Out-of-range values clamp to the epoch.
    pub fn start(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.start_unix_millis)
            .unwrap_or_else(crate::window::unix_epoch)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Rows to skip before the requested page.
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.per_page as u64
    }

    /// Rows to request: one more than the page size to detect a next page.
    pub fn fetch_limit(&self) -> u64 {
        self.per_page as u64 + 1
    }
}

// ============================================
// Ranked items
// ============================================

/// An emoji ranked by how often it was used as a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopReaction {
    pub emoji_name: String,
    pub count: i64,
}

/// Channel type as stored by the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Open,
    Private,
    Direct,
    Group,
}

impl ChannelType {
    /// Single-letter code used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Open => "O",
            ChannelType::Private => "P",
            ChannelType::Direct => "D",
            ChannelType::Group => "G",
        }
    }

    /// Parse the storage code. Unknown codes are treated as private.
    pub fn from_storage(value: &str) -> Self {
        match value {
            "O" => ChannelType::Open,
            "D" => ChannelType::Direct,
            "G" => ChannelType::Group,
            _ => ChannelType::Private,
        }
    }
}

/// A channel ranked by message activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopChannel {
    pub id: String,
    pub display_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub team_id: Option<String>,
    /// Posts created at or after the window start, with no upper bound
    pub message_count: i64,
}

/// A thread root post ranked by replies in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopThread {
    pub post_id: String,
    pub channel_id: String,
    pub channel_display_name: String,
    pub channel_name: String,
    /// Author of the root post
    pub user_id: String,
    pub message: String,
    pub reply_count: i64,
    /// Distinct users who replied, sorted by id
    pub participants: Vec<String>,
}

/// A user who joined the team inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeamMember {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub position: String,
    pub joined_at: DateTime<Utc>,
}

// ============================================
// Results
// ============================================

/// One page of ranked results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedPage<T> {
    pub items: Vec<T>,
    pub has_next: bool,
}

impl<T> RankedPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_next: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for RankedPage<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// New team members page plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTeamMembersResult {
    pub items: Vec<NewTeamMember>,
    pub has_next: bool,
    /// Every qualifying member since the window start, regardless of paging
    pub total_count: i64,
}
