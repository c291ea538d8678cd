//! Command routing and mode state
//!
//! The Router is the dispatch core: it recognizes keywords in protocol
//! lines, resolves them against the active mode, and forwards the resulting
//! host action to the configured sink. The mode toggle remaps the same three
//! physical buttons between player transport and volume control.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ProtocolConfig;
use crate::drivers::ActionSink;
use crate::protocol::DeckCommand;

/// Active semantic mapping for the deck buttons
///
/// Starts at the first variant; the mode-toggle keyword advances cyclically
/// through [`Mode::ALL`] and wraps back to the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Player,
    Volume,
}

impl Mode {
    /// Every mode, in toggle order
    pub const ALL: [Mode; 2] = [Mode::Player, Mode::Volume];

    /// The mode the toggle keyword switches to from `self`
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Player => "player",
            Mode::Volume => "volume",
        }
    }
}

/// Abstract host-control command produced by dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    PlayPause,
    PreviousTrack,
    NextTrack,
    VolumeMute,
    VolumeDown,
    VolumeUp,
}

impl HostAction {
    /// Stable identifier, e.g. for logs and the simulator output
    pub fn id(&self) -> &'static str {
        match self {
            HostAction::PlayPause => "transport:play-pause",
            HostAction::PreviousTrack => "transport:previous",
            HostAction::NextTrack => "transport:next",
            HostAction::VolumeMute => "volume:mute",
            HostAction::VolumeDown => "volume:down",
            HostAction::VolumeUp => "volume:up",
        }
    }
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Fixed `(command, mode)` mapping table
///
/// The mode toggle resolves to no action; everything else resolves to
/// exactly one action per mode.
pub fn resolve(command: DeckCommand, mode: Mode) -> Option<HostAction> {
    match (command, mode) {
        (DeckCommand::Play, Mode::Player) => Some(HostAction::PlayPause),
        (DeckCommand::Play, Mode::Volume) => Some(HostAction::VolumeMute),
        (DeckCommand::Previous, Mode::Player) => Some(HostAction::PreviousTrack),
        (DeckCommand::Previous, Mode::Volume) => Some(HostAction::VolumeDown),
        (DeckCommand::Next, Mode::Player) => Some(HostAction::NextTrack),
        (DeckCommand::Next, Mode::Volume) => Some(HostAction::VolumeUp),
        (DeckCommand::ModeToggle, _) => None,
    }
}

/// Dispatches protocol lines to the action sink, consulting the mode state
pub struct Router {
    keywords: ProtocolConfig,
    mode: Mutex<Mode>,
    sink: Arc<dyn ActionSink>,
}

impl Router {
    pub fn new(keywords: ProtocolConfig, sink: Arc<dyn ActionSink>) -> Self {
        Self {
            keywords,
            mode: Mutex::new(Mode::ALL[0]),
            sink,
        }
    }

    /// Currently active mode
    pub fn mode(&self) -> Mode {
        *self.mode.lock()
    }

    /// Process one protocol line
    ///
    /// Returns the action that was dispatched, if any. Lines matching no
    /// keyword are ignored; the mode toggle mutates mode and dispatches
    /// nothing. Sink failures are logged and swallowed — key injection is
    /// fire-and-forget.
    pub fn on_line(&self, line: &str) -> Option<HostAction> {
        let command = match DeckCommand::match_line(line, &self.keywords) {
            Some(command) => command,
            None => {
                debug!(line, "Ignoring unrecognized line");
                return None;
            }
        };

        if command == DeckCommand::ModeToggle {
            let mut mode = self.mode.lock();
            *mode = mode.next();
            info!("🔀 Mode switched to {}", mode.label());
            return None;
        }

        let mode = *self.mode.lock();
        let action = resolve(command, mode)?;
        debug!(?command, mode = mode.label(), %action, "Dispatching");

        if let Err(e) = self.sink.send(action) {
            warn!("⚠️  Sink '{}' failed for {}: {:#}", self.sink.name(), action, e);
        }

        Some(action)
    }
}
