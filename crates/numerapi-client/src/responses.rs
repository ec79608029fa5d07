//! Typed responses, one per endpoint the client wraps.
//!
//! Decoding is strict: a missing or mistyped field is an
//! [`ApiError::InvalidResponse`], never a silent default.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// A tournament round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round number.
    pub number: u32,
}

/// Timing of the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundWindow {
    /// Round number.
    pub number: u32,
    /// When the round opened.
    pub open_time: DateTime<Utc>,
    /// Submission deadline, once scheduled.
    #[serde(default)]
    pub close_staking_time: Option<DateTime<Utc>>,
}

impl RoundWindow {
    /// Whether submissions are accepted at `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.open_time < now && self.close_staking_time.is_some_and(|deadline| now < deadline)
    }

    /// Whether the round opened less than `window` before `now`.
    pub fn opened_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.open_time > now - window
    }
}

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account id.
    pub id: String,
    /// Public user name.
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mfa_enabled: Option<bool>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// NMR balance, as the decimal string the API returns.
    #[serde(default)]
    pub available_nmr: Option<String>,
    #[serde(default)]
    pub inserted_at: Option<DateTime<Utc>>,
    /// Models in every tournament.
    pub models: Vec<Model>,
}

/// A model owned by the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model UUID.
    pub id: String,
    /// Model name.
    pub name: String,
    /// Tournament id the model competes in.
    pub tournament: u32,
}

/// Where to PUT a file, and the name to refer to it by afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAuth {
    /// Server-assigned file name.
    pub filename: String,
    /// Pre-signed upload URL.
    pub url: String,
}

/// A submission or diagnostics run created from an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSubmission {
    /// Its id.
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountModels {
    pub models: Vec<Model>,
}

/// Decode `data[field]` into `T`.
pub(crate) fn field<T: DeserializeOwned>(data: &Value, field: &str) -> ApiResult<T> {
    let value = data
        .get(field)
        .ok_or_else(|| ApiError::invalid(format!("missing field `{field}`")))?;
    T::deserialize(value).map_err(|e| ApiError::invalid(format!("field `{field}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_named_field() {
        let data = json!({"dataset": "https://example.com/live.parquet"});
        let url: String = field(&data, "dataset").unwrap();
        assert_eq!(url, "https://example.com/live.parquet");
    }

    #[test]
    fn missing_field_is_invalid() {
        let err = field::<String>(&json!({}), "dataset").unwrap_err();
        assert!(err.to_string().contains("dataset"));
    }

    #[test]
    fn missing_nested_member_is_invalid() {
        let data = json!({"submissionUploadAuth": {"url": "https://x"}});
        let err = field::<UploadAuth>(&data, "submissionUploadAuth").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { ref message } if message.contains("filename")));
    }

    #[test]
    fn round_window_open_and_new() {
        let now = Utc::now();
        let window = RoundWindow {
            number: 900,
            open_time: now - Duration::hours(3),
            close_staking_time: Some(now + Duration::hours(40)),
        };
        assert!(window.is_open_at(now));
        assert!(!window.is_open_at(now + Duration::hours(41)));
        assert!(window.opened_within(Duration::hours(12), now));
        assert!(!window.opened_within(Duration::hours(2), now));

        let unscheduled = RoundWindow {
            close_staking_time: None,
            ..window
        };
        assert!(!unscheduled.is_open_at(now));
    }

    #[test]
    fn decodes_account_with_optional_fields() {
        let data = json!({"account": {
            "id": "acc-1",
            "username": "uuazed",
            "availableNmr": "99.01",
            "insertedAt": "2018-01-01T02:16:48Z",
            "models": [{"id": "m-1", "name": "alpha", "tournament": 8}]
        }});
        let account: Account = field(&data, "account").unwrap();
        assert_eq!(account.username, "uuazed");
        assert_eq!(account.available_nmr.as_deref(), Some("99.01"));
        assert_eq!(account.email, None);
        assert_eq!(account.inserted_at.unwrap().to_rfc3339(), "2018-01-01T02:16:48+00:00");
        assert_eq!(account.models.len(), 1);
    }

    #[test]
    fn wrong_type_is_invalid() {
        let data = json!({"rounds": [{"number": "five"}]});
        assert!(field::<Vec<Round>>(&data, "rounds").is_err());
    }
}
