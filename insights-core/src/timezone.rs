//! User timezone preferences
//!
//! Insights windows and buckets follow the caller's local calendar. The
//! preference is stored as three strings: whether to follow the automatically
//! detected zone, the detected zone and a manually chosen one.

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

/// Stored timezone preference of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTimezone {
    #[serde(
        rename = "useAutomaticTimezone",
        default,
        deserialize_with = "bool_or_string"
    )]
    pub use_automatic: bool,
    #[serde(rename = "automaticTimezone", default)]
    pub automatic: String,
    #[serde(rename = "manualTimezone", default)]
    pub manual: String,
}

impl UserTimezone {
    /// A preference pinned to one zone name.
    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            use_automatic: false,
            automatic: String::new(),
            manual: name.into(),
        }
    }

    /// Name of the zone currently in effect, possibly empty.
    pub fn active_name(&self) -> &str {
        if self.use_automatic {
            &self.automatic
        } else {
            &self.manual
        }
    }

    /// Resolve the active zone, falling back to UTC.
    pub fn location(&self) -> Tz {
        parse_timezone(self.active_name())
    }
}

/// Parse an IANA zone name. Empty or unknown names fall back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    let name = name.trim();
    if name.is_empty() {
        return Tz::UTC;
    }

    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %name, "Unknown timezone, using UTC");
            Tz::UTC
        }
    }
}

/// Accepts `true` as well as the string forms `"true"` / `"false"`.
fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}
