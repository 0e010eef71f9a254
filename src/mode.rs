use crate::error::SentryError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating posture of the monitoring node. Motion only escalates to an
/// alert while the node is in `Away`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Home,
    Away,
    Night,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Home => "Home",
            Mode::Away => "Away",
            Mode::Night => "Night",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = SentryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Home" | "home" => Ok(Mode::Home),
            "Away" | "away" => Ok(Mode::Away),
            "Night" | "night" => Ok(Mode::Night),
            other => Err(SentryError::InvalidMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Single authoritative holder of the current operating mode.
///
/// Reads happen on the motion trigger path and writes on the inbound command
/// path concurrently; the internal lock guarantees neither ever observes a
/// partial update.
pub struct ModeStore {
    current: RwLock<Mode>,
}

impl ModeStore {
    pub fn new(initial: Mode) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Mode {
        *self.current.read()
    }

    /// Replace the current mode, returning the previous one.
    pub fn set(&self, mode: Mode) -> Mode {
        let mut current = self.current.write();
        std::mem::replace(&mut *current, mode)
    }

    /// Parse and apply a mode received as text. On an unrecognized value the
    /// store is left untouched and `InvalidMode` is returned.
    pub fn set_from_str(&self, value: &str) -> crate::error::Result<Mode> {
        let mode = Mode::from_str(value)?;
        Ok(self.set(mode))
    }
}

impl Default for ModeStore {
    fn default() -> Self {
        Self::new(Mode::Home)
    }
}
