//! Moderation strike record and sender profile

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const PERMANENT: &str = "permanent";

/// When a ban ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBanExpiry", into = "RawBanExpiry")]
pub enum BanExpiry {
    /// Never lifts.
    Permanent,
    /// Lifts at this Unix ms timestamp.
    Until(i64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawBanExpiry {
    Millis(i64),
    Text(String),
}

impl TryFrom<RawBanExpiry> for BanExpiry {
    type Error = String;

    fn try_from(value: RawBanExpiry) -> Result<Self, Self::Error> {
        match value {
            RawBanExpiry::Millis(millis) => Ok(Self::Until(millis)),
            RawBanExpiry::Text(text) if text.eq_ignore_ascii_case(PERMANENT) => Ok(Self::Permanent),
            RawBanExpiry::Text(text) => Err(format!("unrecognized ban expiry '{text}'")),
        }
    }
}

impl From<BanExpiry> for RawBanExpiry {
    fn from(value: BanExpiry) -> Self {
        match value {
            BanExpiry::Permanent => Self::Text(PERMANENT.to_string()),
            BanExpiry::Until(millis) => Self::Millis(millis),
        }
    }
}

impl FromStr for BanExpiry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(PERMANENT) {
            return Ok(Self::Permanent);
        }
        trimmed
            .parse::<i64>()
            .map(Self::Until)
            .map_err(|_| Error::InvalidInput(format!("expected Unix ms or 'permanent', got '{s}'")))
    }
}

impl fmt::Display for BanExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => f.write_str(PERMANENT),
            Self::Until(millis) => write!(f, "{millis}"),
        }
    }
}

/// Ban/strike state owned by the moderation authority; read-only here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeRecord {
    #[serde(default)]
    pub strike_count: u32,
    #[serde(default)]
    pub banned_until: Option<BanExpiry>,
}

/// The signed-in user composing messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    /// Paid subscriber; may post links and skips interstitials.
    #[serde(default)]
    pub is_subscriber: bool,
    #[serde(default)]
    pub is_moderator: bool,
    #[serde(default)]
    pub strikes: StrikeRecord,
}

impl SenderProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Whether links are allowed in this sender's messages.
    pub const fn may_post_links(&self) -> bool {
        self.is_subscriber || self.is_moderator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_expiry_accepts_number_or_permanent() {
        let record: StrikeRecord =
            serde_json::from_str(r#"{ "strikeCount": 2, "bannedUntil": "permanent" }"#).unwrap();
        assert_eq!(record.banned_until, Some(BanExpiry::Permanent));

        let record: StrikeRecord =
            serde_json::from_str(r#"{ "strikeCount": 1, "bannedUntil": 1700000000000 }"#).unwrap();
        assert_eq!(record.banned_until, Some(BanExpiry::Until(1_700_000_000_000)));

        let record: StrikeRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record, StrikeRecord::default());
    }

    #[test]
    fn ban_expiry_rejects_unknown_text() {
        assert!(serde_json::from_str::<StrikeRecord>(r#"{ "bannedUntil": "soon" }"#).is_err());
        assert!("soon".parse::<BanExpiry>().is_err());
        assert_eq!("Permanent".parse::<BanExpiry>().unwrap(), BanExpiry::Permanent);
    }

    #[test]
    fn ban_expiry_serializes_back_to_wire_shape() {
        let json = serde_json::to_string(&BanExpiry::Permanent).unwrap();
        assert_eq!(json, r#""permanent""#);
        let json = serde_json::to_string(&BanExpiry::Until(42)).unwrap();
        assert_eq!(json, "42");
    }
}
