//! Persisted record types for the moderation collections
//!
//! The backing store keeps flat string-keyed documents; snowflake ids travel
//! as strings and mute expiries as unix timestamps, matching what the backend
//! already holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Punishment recorded on the warning that triggered it
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
pub enum AppliedPunishment {
    #[serde(rename = "MUTE")]
    #[display("MUTE")]
    Mute,
    #[serde(rename = "BAN")]
    #[display("BAN")]
    Ban,
}

/// A single warning issued to a user in a guild
///
/// `count` is 1-based and assigned as (existing warnings for the pair) + 1 at
/// insertion time; it is unique only per (user, guild). `punishment_level`
/// starts empty and is written at most once, when an automatic punishment
/// fires on this warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecord {
    #[serde(with = "id_string")]
    pub user_id: u64,
    #[serde(with = "id_string")]
    pub guild_id: u64,
    pub reason: String,
    #[serde(with = "id_string")]
    pub moderator_id: u64,
    pub count: u32,
    pub punishment_level: Option<AppliedPunishment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// An active timed mute with its expiry instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRecord {
    #[serde(with = "id_string")]
    pub user_id: u64,
    #[serde(with = "id_string")]
    pub guild_id: u64,
    #[serde(with = "id_string")]
    pub moderator_id: u64,
    pub reason: String,
    #[serde(with = "unix_seconds")]
    pub ends_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl MuteRecord {
    /// Whether the mute's nominal expiry has passed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ends_at <= now
    }
}

/// A ban on record; removed again on unban
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRecord {
    #[serde(with = "id_string")]
    pub user_id: u64,
    #[serde(with = "id_string")]
    pub guild_id: u64,
    pub reason: String,
    #[serde(with = "id_string")]
    pub moderator_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Per-guild bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildSettings {
    #[serde(with = "id_string")]
    pub guild_id: u64,
    #[serde(default, with = "opt_id_string")]
    pub mod_logs_channel_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Serialize a record for the store
pub fn to_document<T: Serialize>(record: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(record).map_err(StoreError::Decode)
}

/// Decode a store document into a typed record
pub fn from_document<T: for<'de> Deserialize<'de>>(
    document: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(document).map_err(StoreError::Decode)
}

/// Snowflake ids as strings on the wire
pub(crate) mod id_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        // The backend echoes ids back as strings but tolerate raw numbers too.
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
            serde_json::Value::Number(n) => {
                n.as_u64().ok_or_else(|| D::Error::custom("id out of range"))
            }
            other => Err(D::Error::custom(format!("unexpected id value: {other}"))),
        }
    }
}

/// Optional snowflake id as an optional string
pub(crate) mod opt_id_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &Option<u64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => s.parse().map(Some).map_err(D::Error::custom),
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| D::Error::custom("id out of range")),
            Some(other) => Err(D::Error::custom(format!("unexpected id value: {other}"))),
        }
    }
}

/// Expiry instants as unix timestamps, stored numerically for comparison
pub(crate) mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let secs = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| D::Error::custom("timestamp out of range"))?,
            serde_json::Value::String(s) => s.parse().map_err(D::Error::custom)?,
            other => return Err(D::Error::custom(format!("unexpected timestamp: {other}"))),
        };
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_warning_roundtrip() {
        let record = WarningRecord {
            user_id: 12345,
            guild_id: 67890,
            reason: "spamming".to_string(),
            moderator_id: 11111,
            count: 3,
            punishment_level: None,
            created_at: None,
        };

        let document = to_document(&record).expect("serialize");
        assert_eq!(document["user_id"], json!("12345"));
        assert_eq!(document["guild_id"], json!("67890"));
        assert_eq!(document["count"], json!(3));
        assert_eq!(document["punishment_level"], serde_json::Value::Null);

        let decoded: WarningRecord = from_document(document).expect("deserialize");
        assert_eq!(decoded.user_id, 12345);
        assert_eq!(decoded.count, 3);
        assert!(decoded.punishment_level.is_none());
    }

    #[test]
    fn test_warning_punishment_level_names() {
        let document = json!({
            "user_id": "1",
            "guild_id": "2",
            "reason": "r",
            "moderator_id": "3",
            "count": 7,
            "punishment_level": "BAN",
        });
        let decoded: WarningRecord = from_document(document).expect("deserialize");
        assert_eq!(decoded.punishment_level, Some(AppliedPunishment::Ban));
        assert_eq!(AppliedPunishment::Mute.to_string(), "MUTE");
    }

    #[test]
    fn test_mute_timestamp_tolerates_float() {
        // The previous writer stored fractional timestamps.
        let document = json!({
            "user_id": "1",
            "guild_id": "2",
            "moderator_id": "3",
            "reason": "r",
            "ends_at": 1_700_000_000.75,
        });
        let decoded: MuteRecord = from_document(document).expect("deserialize");
        assert_eq!(decoded.ends_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_mute_expiry_comparison() {
        let now = Utc::now();
        let mute = MuteRecord {
            user_id: 1,
            guild_id: 2,
            moderator_id: 3,
            reason: "r".to_string(),
            ends_at: now - chrono::Duration::seconds(1),
            created_at: None,
        };
        assert!(mute.is_expired(now));
        assert!(!MuteRecord { ends_at: now + chrono::Duration::seconds(60), ..mute }.is_expired(now));
    }

    #[test]
    fn test_guild_settings_optional_channel() {
        let decoded: GuildSettings =
            from_document(json!({"guild_id": "42"})).expect("deserialize");
        assert_eq!(decoded.guild_id, 42);
        assert!(decoded.mod_logs_channel_id.is_none());

        let decoded: GuildSettings =
            from_document(json!({"guild_id": "42", "mod_logs_channel_id": "77"}))
                .expect("deserialize");
        assert_eq!(decoded.mod_logs_channel_id, Some(77));
    }

    #[test]
    fn test_ids_accept_numbers() {
        let decoded: BanRecord = from_document(json!({
            "user_id": 9,
            "guild_id": "10",
            "reason": "r",
            "moderator_id": 11,
        }))
        .expect("deserialize");
        assert_eq!(decoded.user_id, 9);
        assert_eq!(decoded.guild_id, 10);
    }
}
