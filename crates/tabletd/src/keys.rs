//! Local keyboard shortcuts.
//!
//! The browser owns the screen, so key names arrive line by line on stdin
//! (from a terminal, a hotkey daemon or a wrapper script), e.g. `F1`.

use crate::coordinator::Event;
use std::io::BufRead;
use std::thread::JoinHandle;
use tablet_core::config::ShortcutConfig;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    SwitchApp,
    ToggleFullscreen,
    Quit,
}

/// Key name → shortcut, matched ignoring case and whitespace.
#[derive(Debug, Clone)]
pub struct ShortcutMap {
    bindings: Vec<(String, Shortcut)>,
}

impl ShortcutMap {
    pub fn from_config(config: &ShortcutConfig) -> Self {
        Self {
            bindings: vec![
                (normalize(&config.switch_app), Shortcut::SwitchApp),
                (normalize(&config.exit_fullscreen), Shortcut::ToggleFullscreen),
                (normalize(&config.quit_app), Shortcut::Quit),
            ],
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Shortcut> {
        let key = normalize(key);
        if key.is_empty() {
            return None;
        }
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, shortcut)| *shortcut)
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Read key names from stdin on a detached thread until stdin closes.
pub fn spawn_key_reader(
    map: ShortcutMap,
    events: mpsc::Sender<Event>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("tablet-keys".into())
        .spawn(move || {
            read_keys(std::io::stdin().lock(), &map, &events);
            tracing::debug!("shortcut input closed");
        })
}

fn read_keys<R: BufRead>(reader: R, map: &ShortcutMap, events: &mpsc::Sender<Event>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "shortcut input failed");
                return;
            }
        };
        match map.lookup(&line) {
            Some(shortcut) => {
                tracing::debug!(key = %line.trim(), ?shortcut, "shortcut");
                if events.blocking_send(Event::Shortcut(shortcut)).is_err() {
                    return;
                }
            }
            None => tracing::debug!(key = %line.trim(), "unbound key"),
        }
    }
}
