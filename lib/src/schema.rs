//! Client payload validation.
//!
//! Message and flash bodies share one schema: `message` is required, the other
//! fields are optional, and anything not listed is rejected.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;
use crate::model::{Flash, Message, Rgb};

/// Naive formats accepted for `expires`, interpreted in local time.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<Expiry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink: Option<Vec<Rgb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlight: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// `expires` as sent by a client: seconds from now, or a datetime string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiry {
    Seconds(u64),
    At(String),
}

impl MessagePayload {
    pub fn from_value(value: Value) -> Result<Self, CommandError> {
        let payload: MessagePayload =
            serde_json::from_value(value).map_err(|e| CommandError::Validation(e.to_string()))?;
        payload.check()?;
        Ok(payload)
    }

    fn check(&self) -> Result<(), CommandError> {
        if let Some(blink) = &self.blink
            && blink.is_empty()
        {
            return Err(CommandError::Validation(
                "blink must contain at least one color".to_string(),
            ));
        }
        if self.timeout == Some(0) {
            return Err(CommandError::Validation(
                "timeout must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the stored record, resolving `expires` against `now`.
    pub fn into_message(self, id: String, now: DateTime<Utc>) -> Result<Message, CommandError> {
        let expires = self
            .expires
            .as_ref()
            .map(|expiry| expiry.resolve(now))
            .transpose()?;
        Ok(Message {
            id,
            text: self.message,
            color: self.color,
            backlight: self.backlight,
            blink: self.blink,
            timeout: self.timeout,
            expires,
        })
    }

    /// The flash keeps the payload as sent. `expires` is still checked so a
    /// malformed date is rejected the same way as for messages.
    pub fn into_flash(self, now: DateTime<Utc>) -> Result<Flash, CommandError> {
        if let Some(expiry) = &self.expires {
            expiry.resolve(now)?;
        }
        Ok(Flash {
            text: self.message,
            color: self.color,
            backlight: self.backlight,
            blink: self.blink,
            timeout: self.timeout,
            expires: self.expires,
            id: self.id,
        })
    }
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        MessagePayload {
            message: message.text.clone(),
            expires: message.expires.map(|at| Expiry::At(at.to_rfc3339())),
            color: message.color,
            blink: message.blink.clone(),
            backlight: message.backlight,
            timeout: message.timeout,
            id: Some(message.id.clone()),
        }
    }
}

impl Expiry {
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CommandError> {
        match self {
            Expiry::Seconds(seconds) => Ok(deadline(now, *seconds)),
            Expiry::At(raw) => parse_expires(raw),
        }
    }
}

/// `now + seconds`, saturating instead of overflowing.
pub fn deadline(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    TimeDelta::try_seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Parses an absolute expiry. Strings without an offset are local time.
pub fn parse_expires(raw: &str) -> Result<DateTime<Utc>, CommandError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        });
    naive
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| CommandError::Validation(format!("Invalid expiration '{raw}'")))
}

/// Brightness and contrast: an integer in `1..=255`.
pub fn validate_level(value: &Value) -> Result<u8, CommandError> {
    let level = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| CommandError::BadRequest(format!("{value} is not an integer")))?;

    u8::try_from(level)
        .ok()
        .filter(|level| *level >= 1)
        .ok_or_else(|| CommandError::Validation(format!("{level} is not between 1 and 255")))
}
