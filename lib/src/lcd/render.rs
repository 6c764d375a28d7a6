//! Text layout for a fixed-size character panel and the driver's cached view
//! of what the panel currently shows.

use crate::model::Rgb;

/// Splits `text` into panel rows: first on line breaks (CR, LF or CRLF), then
/// each line into `width`-character chunks. Empty lines produce no rows.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    text.replace("\r\n", "\n")
        .split(['\r', '\n'])
        .flat_map(|line| {
            let chars: Vec<char> = line.chars().collect();
            chars
                .chunks(width)
                .map(|chunk| chunk.iter().collect::<String>())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// The `height` rows starting at `offset`, each padded or cut to `width`, as
/// one string written from the home position. Rows past the end of `lines`
/// are blank so a short last window overwrites what was there. Empty when
/// there is nothing to show at `offset`.
pub fn window(lines: &[String], offset: usize, width: usize, height: usize) -> String {
    if offset >= lines.len() {
        return String::new();
    }
    (0..height)
        .map(|row| {
            let line = lines.get(offset + row).map(String::as_str).unwrap_or("");
            format!("{line:<width$.width$}")
        })
        .collect::<String>()
        .chars()
        .take(width * height)
        .collect()
}

/// What the driver last wrote. `None` means unknown, so the first message
/// after start renders every field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub text: Option<String>,
    pub lines: Vec<String>,
    /// First visible row of `lines`.
    pub offset: usize,
    pub color: Option<Rgb>,
    pub backlight: Option<bool>,
    pub blink: Vec<Rgb>,
    pub blink_index: usize,
}

impl RenderState {
    pub fn is_blinking(&self) -> bool {
        !self.blink.is_empty()
    }
}
