//! Byte-level command set of the serial character LCD.
//!
//! Every command is the escape byte `0xFE`, an opcode, then zero or more raw
//! argument bytes. Display text is written without any framing.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::error::CommandError;
use crate::model::Rgb;

pub const ESCAPE: u8 = 0xFE;

/// Argument value the panel expects with "backlight on".
pub const BACKLIGHT_ON: u8 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown LCD command '{0}'")]
    UnknownCommand(String),
    #[error("Argument count mismatch for {command}; expected {expected}, but {actual} were received.")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("argument {value} to {command} does not fit in a byte")]
    ByteRange { command: &'static str, value: Value },
    #[error("argument {value} to {command} must be a string")]
    NotText { command: &'static str, value: Value },
}

impl From<ProtocolError> for CommandError {
    fn from(err: ProtocolError) -> Self {
        CommandError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LcdCommand {
    On(u8),
    Off,
    SetBrightness(u8),
    SetContrast(u8),
    EnableAutoscroll,
    DisableAutoscroll,
    Clear,
    SetSplashScreen(String),
    SetCursorPosition { col: u8, row: u8 },
    CursorHome,
    CursorBackward,
    CursorForward,
    CursorUnderlineOn,
    CursorUnderlineOff,
    CursorBlockOn,
    CursorBlockOff,
    SetBacklightColor(Rgb),
    SetLcdSize { cols: u8, rows: u8 },
    GpoOff,
    GpoOn,
}

/// Shape of a command's arguments, used when building from untyped input.
enum Args {
    Bytes(usize),
    Text,
}

const TABLE: &[(&str, Args)] = &[
    ("on", Args::Bytes(1)),
    ("off", Args::Bytes(0)),
    ("set_brightness", Args::Bytes(1)),
    ("set_contrast", Args::Bytes(1)),
    ("enable_autoscroll", Args::Bytes(0)),
    ("disable_autoscroll", Args::Bytes(0)),
    ("clear", Args::Bytes(0)),
    ("set_splash_screen", Args::Text),
    ("set_cursor_position", Args::Bytes(2)),
    ("cursor_home", Args::Bytes(0)),
    ("cursor_backward", Args::Bytes(0)),
    ("cursor_forward", Args::Bytes(0)),
    ("cursor_underline_on", Args::Bytes(0)),
    ("cursor_underline_off", Args::Bytes(0)),
    ("cursor_block_on", Args::Bytes(0)),
    ("cursor_block_off", Args::Bytes(0)),
    ("set_backlight_color", Args::Bytes(3)),
    ("set_lcd_size", Args::Bytes(2)),
    ("gpo_off", Args::Bytes(0)),
    ("gpo_on", Args::Bytes(0)),
];

impl LcdCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LcdCommand::On(_) => "on",
            LcdCommand::Off => "off",
            LcdCommand::SetBrightness(_) => "set_brightness",
            LcdCommand::SetContrast(_) => "set_contrast",
            LcdCommand::EnableAutoscroll => "enable_autoscroll",
            LcdCommand::DisableAutoscroll => "disable_autoscroll",
            LcdCommand::Clear => "clear",
            LcdCommand::SetSplashScreen(_) => "set_splash_screen",
            LcdCommand::SetCursorPosition { .. } => "set_cursor_position",
            LcdCommand::CursorHome => "cursor_home",
            LcdCommand::CursorBackward => "cursor_backward",
            LcdCommand::CursorForward => "cursor_forward",
            LcdCommand::CursorUnderlineOn => "cursor_underline_on",
            LcdCommand::CursorUnderlineOff => "cursor_underline_off",
            LcdCommand::CursorBlockOn => "cursor_block_on",
            LcdCommand::CursorBlockOff => "cursor_block_off",
            LcdCommand::SetBacklightColor(_) => "set_backlight_color",
            LcdCommand::SetLcdSize { .. } => "set_lcd_size",
            LcdCommand::GpoOff => "gpo_off",
            LcdCommand::GpoOn => "gpo_on",
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            LcdCommand::On(_) => 0x42,
            LcdCommand::Off => 0x46,
            LcdCommand::SetBrightness(_) => 0x99,
            LcdCommand::SetContrast(_) => 0x50,
            LcdCommand::EnableAutoscroll => 0x51,
            LcdCommand::DisableAutoscroll => 0x52,
            LcdCommand::Clear => 0x58,
            LcdCommand::SetSplashScreen(_) => 0x40,
            LcdCommand::SetCursorPosition { .. } => 0x47,
            LcdCommand::CursorHome => 0x48,
            LcdCommand::CursorBackward => 0x4C,
            LcdCommand::CursorForward => 0x4D,
            LcdCommand::CursorUnderlineOn => 0x4A,
            LcdCommand::CursorUnderlineOff => 0x4B,
            LcdCommand::CursorBlockOn => 0x53,
            LcdCommand::CursorBlockOff => 0x54,
            LcdCommand::SetBacklightColor(_) => 0xD0,
            LcdCommand::SetLcdSize { .. } => 0xD1,
            LcdCommand::GpoOff => 0x56,
            LcdCommand::GpoOn => 0x57,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![ESCAPE, self.opcode()];
        match self {
            LcdCommand::On(value)
            | LcdCommand::SetBrightness(value)
            | LcdCommand::SetContrast(value) => bytes.push(*value),
            LcdCommand::SetSplashScreen(text) => bytes.extend(encode_text(text)),
            LcdCommand::SetCursorPosition { col, row } => bytes.extend([*col, *row]),
            LcdCommand::SetBacklightColor(rgb) => bytes.extend(rgb),
            LcdCommand::SetLcdSize { cols, rows } => bytes.extend([*cols, *rows]),
            _ => {}
        }
        bytes
    }

    /// Builds a command from its name and untyped arguments, checking the
    /// argument count and that every numeric argument fits in one byte.
    pub fn from_name(name: &str, args: &[Value]) -> Result<Self, ProtocolError> {
        let (command, shape) = TABLE
            .iter()
            .find(|(command, _)| *command == name)
            .map(|(command, shape)| (*command, shape))
            .ok_or_else(|| ProtocolError::UnknownCommand(name.to_string()))?;

        let expected = match shape {
            Args::Bytes(count) => *count,
            Args::Text => 1,
        };
        if args.len() != expected {
            return Err(ProtocolError::ArgumentCount {
                command,
                expected,
                actual: args.len(),
            });
        }

        if let Args::Text = shape {
            let text = args[0].as_str().ok_or_else(|| ProtocolError::NotText {
                command,
                value: args[0].clone(),
            })?;
            return Ok(LcdCommand::SetSplashScreen(text.to_string()));
        }

        let bytes = args
            .iter()
            .map(|value| byte(command, value))
            .collect::<Result<Vec<u8>, _>>()?;

        Ok(match (command, bytes.as_slice()) {
            ("on", [value]) => LcdCommand::On(*value),
            ("set_brightness", [value]) => LcdCommand::SetBrightness(*value),
            ("set_contrast", [value]) => LcdCommand::SetContrast(*value),
            ("set_cursor_position", [col, row]) => LcdCommand::SetCursorPosition {
                col: *col,
                row: *row,
            },
            ("set_backlight_color", [r, g, b]) => LcdCommand::SetBacklightColor([*r, *g, *b]),
            ("set_lcd_size", [cols, rows]) => LcdCommand::SetLcdSize {
                cols: *cols,
                rows: *rows,
            },
            ("off", []) => LcdCommand::Off,
            ("enable_autoscroll", []) => LcdCommand::EnableAutoscroll,
            ("disable_autoscroll", []) => LcdCommand::DisableAutoscroll,
            ("clear", []) => LcdCommand::Clear,
            ("cursor_home", []) => LcdCommand::CursorHome,
            ("cursor_backward", []) => LcdCommand::CursorBackward,
            ("cursor_forward", []) => LcdCommand::CursorForward,
            ("cursor_underline_on", []) => LcdCommand::CursorUnderlineOn,
            ("cursor_underline_off", []) => LcdCommand::CursorUnderlineOff,
            ("cursor_block_on", []) => LcdCommand::CursorBlockOn,
            ("cursor_block_off", []) => LcdCommand::CursorBlockOff,
            ("gpo_off", []) => LcdCommand::GpoOff,
            ("gpo_on", []) => LcdCommand::GpoOn,
            _ => return Err(ProtocolError::UnknownCommand(name.to_string())),
        })
    }
}

impl fmt::Display for LcdCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LCD Command \"{}\"", escape(&self.encode()))
    }
}

fn byte(command: &'static str, value: &Value) -> Result<u8, ProtocolError> {
    value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| ProtocolError::ByteRange {
            command,
            value: value.clone(),
        })
}

/// Text as the panel receives it: one byte per character, anything outside
/// ASCII replaced with `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Printable rendering of raw bytes for logs, e.g. `\xfeX`.
pub fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}
