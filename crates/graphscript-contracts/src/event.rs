//! Event names a script program can react to.
//!
//! Event names travel over the control channel as plain strings
//! (`PROGRAM_START`, `KEY_A_PRESSED`, ...) so the generated script and the
//! runtime agree on them without sharing Rust types.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A key a key-press event handler can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Up,
    Down,
    Left,
    Right,
    Space,
    Enter,
    Shift,
    Ctrl,
    /// A digit key, `0` through `9`.
    Digit(u8),
    /// A letter key, stored uppercase.
    Letter(char),
}

impl KeyCode {
    /// Build a letter key code. Returns `None` for non-ASCII-alphabetic input.
    pub fn letter(c: char) -> Option<Self> {
        if c.is_ascii_alphabetic() {
            Some(Self::Letter(c.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// Build a digit key code. Returns `None` for values above 9.
    pub fn digit(d: u8) -> Option<Self> {
        if d <= 9 {
            Some(Self::Digit(d))
        } else {
            None
        }
    }

    /// The token used inside an event name, e.g. `A` in `KEY_A_PRESSED`.
    pub fn token(&self) -> String {
        match self {
            Self::Up => "UP".to_string(),
            Self::Down => "DOWN".to_string(),
            Self::Left => "LEFT".to_string(),
            Self::Right => "RIGHT".to_string(),
            Self::Space => "SPACE".to_string(),
            Self::Enter => "ENTER".to_string(),
            Self::Shift => "SHIFT".to_string(),
            Self::Ctrl => "CTRL".to_string(),
            Self::Digit(d) => d.to_string(),
            Self::Letter(c) => c.to_string(),
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            "LEFT" => Some(Self::Left),
            "RIGHT" => Some(Self::Right),
            "SPACE" => Some(Self::Space),
            "ENTER" => Some(Self::Enter),
            "SHIFT" => Some(Self::Shift),
            "CTRL" => Some(Self::Ctrl),
            _ => {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_digit() => Self::digit(c as u8 - b'0'),
                    (Some(c), None) => Self::letter(c),
                    _ => None,
                }
            }
        }
    }
}

/// Name of an event the runtime can fire handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Fired once when the program starts.
    ProgramStart,
    /// Fired each time the named key is pressed.
    KeyPressed(KeyCode),
}

impl EventName {
    /// The string form used in generated code and on the wire.
    pub fn as_code(&self) -> String {
        match self {
            Self::ProgramStart => "PROGRAM_START".to_string(),
            Self::KeyPressed(key) => format!("KEY_{}_PRESSED", key.token()),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_code())
    }
}

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "PROGRAM_START" {
            return Ok(Self::ProgramStart);
        }
        s.strip_prefix("KEY_")
            .and_then(|rest| rest.strip_suffix("_PRESSED"))
            .and_then(KeyCode::from_token)
            .map(Self::KeyPressed)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

/// Error returned when parsing an unrecognized event name string.
#[derive(Debug, Clone)]
pub struct UnknownEventName(pub String);

impl fmt::Display for UnknownEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event name: {}", self.0)
    }
}

impl std::error::Error for UnknownEventName {}

impl Serialize for EventName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_code())
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
