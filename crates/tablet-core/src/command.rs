//! Remote commands received on the `<prefix>/command/<kind>` topics.

use crate::types::AppSelection;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command topic: {0}")]
    UnknownKind(String),
    #[error("invalid brightness payload {0:?}: expected an integer")]
    InvalidBrightness(String),
    #[error("invalid {kind} payload {payload:?}: expected one of {expected}")]
    InvalidChoice {
        kind: &'static str,
        payload: String,
        expected: &'static str,
    },
}

/// The four command topics the bridge subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Brightness,
    Screen,
    SwitchApp,
    PresenceDetection,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Brightness,
        CommandKind::Screen,
        CommandKind::SwitchApp,
        CommandKind::PresenceDetection,
    ];

    /// Last topic segment, e.g. `switch_app`.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Brightness => "brightness",
            CommandKind::Screen => "screen",
            CommandKind::SwitchApp => "switch_app",
            CommandKind::PresenceDetection => "presence_detection",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CommandError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| CommandError::UnknownKind(name.to_string()))
    }
}

/// Target of a `switch_app` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppTarget {
    App(AppSelection),
    Toggle,
}

impl AppTarget {
    /// Resolve against the app currently shown.
    pub fn resolve(self, current: AppSelection) -> AppSelection {
        match self {
            AppTarget::App(app) => app,
            AppTarget::Toggle => current.toggled(),
        }
    }
}

/// A parsed remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Brightness percent, already clamped into 0–100.
    Brightness(u8),
    /// Screen power: `true` = on.
    Screen(bool),
    SwitchApp(AppTarget),
    /// Presence detection enabled flag.
    PresenceDetection(bool),
}

impl Command {
    /// Parse a payload received for `kind`.
    ///
    /// Word payloads are case-insensitive and surrounding whitespace is
    /// ignored. Integer brightness outside 0–100 is clamped; anything that is
    /// not an integer is rejected.
    pub fn parse(kind: CommandKind, payload: &str) -> Result<Self, CommandError> {
        let text = payload.trim();
        match kind {
            CommandKind::Brightness => {
                let level: i64 = text
                    .parse()
                    .map_err(|_| CommandError::InvalidBrightness(text.to_string()))?;
                Ok(Command::Brightness(level.clamp(0, 100) as u8))
            }
            CommandKind::Screen => parse_switch(kind, text).map(Command::Screen),
            CommandKind::PresenceDetection => {
                parse_switch(kind, text).map(Command::PresenceDetection)
            }
            CommandKind::SwitchApp => {
                if text.eq_ignore_ascii_case("toggle") {
                    return Ok(Command::SwitchApp(AppTarget::Toggle));
                }
                AppSelection::parse(text)
                    .map(|app| Command::SwitchApp(AppTarget::App(app)))
                    .ok_or_else(|| CommandError::InvalidChoice {
                        kind: kind.as_str(),
                        payload: text.to_string(),
                        expected: "home_assistant, cookbook, toggle",
                    })
            }
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Brightness(_) => CommandKind::Brightness,
            Command::Screen(_) => CommandKind::Screen,
            Command::SwitchApp(_) => CommandKind::SwitchApp,
            Command::PresenceDetection(_) => CommandKind::PresenceDetection,
        }
    }
}

fn parse_switch(kind: CommandKind, text: &str) -> Result<bool, CommandError> {
    match text.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(CommandError::InvalidChoice {
            kind: kind.as_str(),
            payload: text.to_string(),
            expected: "on, off",
        }),
    }
}
