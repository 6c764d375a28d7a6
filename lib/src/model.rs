//! Records exchanged between the actors and their merge-with-defaults rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::Expiry;

/// Backlight color as `[red, green, blue]`.
pub type Rgb = [u8; 3];

pub const WHITE: Rgb = [255, 255, 255];
pub const RED: Rgb = [255, 0, 0];
pub const BLACK: Rgb = [0, 0, 0];

/// A queued message, as stored by the orchestrator and returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlight: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink: Option<Vec<Rgb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at < now)
    }

    pub fn resolve(&self, defaults: &MessageDefaults) -> Display {
        Display {
            text: self.text.clone(),
            color: self.color.unwrap_or(defaults.color),
            backlight: self.backlight.unwrap_or(defaults.backlight),
            blink: self.blink.clone().unwrap_or_default(),
        }
    }
}

/// The single override that preempts message rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    #[serde(rename = "message")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlight: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink: Option<Vec<Rgb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Kept as sent and echoed back; a flash is cleared by its timeout only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<Expiry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Flash {
    /// Returns a copy with every optional field filled in from `defaults`.
    pub fn with_defaults(&self, defaults: &FlashDefaults) -> Flash {
        Flash {
            text: self.text.clone(),
            color: Some(self.color.unwrap_or(defaults.color)),
            backlight: Some(self.backlight.unwrap_or(defaults.backlight)),
            blink: Some(
                self.blink
                    .clone()
                    .unwrap_or_else(|| defaults.blink.clone()),
            ),
            timeout: Some(self.timeout.unwrap_or(defaults.timeout)),
            expires: self.expires.clone(),
            id: self.id.clone(),
        }
    }

    pub fn timeout_or(&self, defaults: &FlashDefaults) -> u64 {
        self.timeout.unwrap_or(defaults.timeout)
    }

    pub fn resolve(&self, defaults: &FlashDefaults) -> Display {
        Display {
            text: self.text.clone(),
            color: self.color.unwrap_or(defaults.color),
            backlight: self.backlight.unwrap_or(defaults.backlight),
            blink: self
                .blink
                .clone()
                .unwrap_or_else(|| defaults.blink.clone()),
        }
    }
}

/// Fully resolved content pushed to the LCD driver every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Display {
    #[serde(rename = "message")]
    pub text: String,
    pub color: Rgb,
    pub backlight: bool,
    pub blink: Vec<Rgb>,
}

impl Display {
    /// Shown when there is neither a flash nor a queued message.
    pub fn no_messages() -> Self {
        Display {
            text: String::new(),
            color: WHITE,
            backlight: false,
            blink: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefaults {
    pub color: Rgb,
    pub backlight: bool,
    /// Seconds a message stays on screen once selected.
    pub interval: u64,
}

impl Default for MessageDefaults {
    fn default() -> Self {
        Self {
            color: WHITE,
            backlight: true,
            interval: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlashDefaults {
    pub color: Rgb,
    pub backlight: bool,
    pub blink: Vec<Rgb>,
    /// Seconds before a flash clears itself.
    pub timeout: u64,
}

impl Default for FlashDefaults {
    fn default() -> Self {
        Self {
            color: WHITE,
            backlight: true,
            blink: vec![RED, BLACK],
            timeout: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bare_message(text: &str) -> Message {
        Message {
            id: "m1".to_string(),
            text: text.to_string(),
            color: None,
            backlight: None,
            blink: None,
            timeout: None,
            expires: None,
        }
    }

    #[test]
    fn test_message_defaults() {
        let display = bare_message("hi").resolve(&MessageDefaults::default());
        assert_eq!(display.text, "hi");
        assert_eq!(display.color, WHITE);
        assert!(display.backlight);
        assert!(display.blink.is_empty());
        assert_eq!(MessageDefaults::default().interval, 5);
    }

    #[test]
    fn test_message_fields_override_defaults() {
        let mut message = bare_message("hi");
        message.color = Some([0, 0, 255]);
        message.backlight = Some(false);
        message.blink = Some(vec![RED]);
        let display = message.resolve(&MessageDefaults::default());
        assert_eq!(display.color, [0, 0, 255]);
        assert!(!display.backlight);
        assert_eq!(display.blink, vec![RED]);
    }

    #[test]
    fn test_flash_defaults_blink_red_and_black() {
        let flash = Flash {
            text: "alert".to_string(),
            color: None,
            backlight: None,
            blink: None,
            timeout: None,
            expires: None,
            id: None,
        };
        let defaults = FlashDefaults::default();
        let display = flash.resolve(&defaults);
        assert_eq!(display.blink, vec![RED, BLACK]);
        assert!(display.backlight);

        let merged = flash.with_defaults(&defaults);
        assert_eq!(merged.timeout, Some(10));
        assert_eq!(merged.blink, Some(vec![RED, BLACK]));
        assert_eq!(flash.timeout_or(&defaults), 10);
    }

    #[test]
    fn test_message_serializes_with_client_field_names() {
        let value = serde_json::to_value(bare_message("hi")).unwrap();
        assert_eq!(value, json!({"id": "m1", "message": "hi"}));
    }
}
