use serde::{Deserialize, Serialize};
use std::fmt;

/// Named keys the login flow needs, with their W3C WebDriver code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Tab,
    Enter,
    Escape,
}

impl Key {
    /// The private-use code point WebDriver reserves for this key.
    pub fn code_point(self) -> char {
        match self {
            Key::Tab => '\u{E004}',
            Key::Enter => '\u{E007}',
            Key::Escape => '\u{E00C}',
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Tab => f.write_str("Tab"),
            Key::Enter => f.write_str("Enter"),
            Key::Escape => f.write_str("Escape"),
        }
    }
}

/// One key press: either a literal character or a named key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Key(Key),
}

impl KeyInput {
    /// Splits `text` into one input per character.
    pub fn chars(text: &str) -> Vec<KeyInput> {
        text.chars().map(KeyInput::Char).collect()
    }

    /// The value sent in a WebDriver `keyDown`/`keyUp` action.
    pub fn wire_value(self) -> String {
        match self {
            KeyInput::Char(c) => c.to_string(),
            KeyInput::Key(k) => k.code_point().to_string(),
        }
    }
}

impl From<Key> for KeyInput {
    fn from(key: Key) -> Self {
        KeyInput::Key(key)
    }
}
