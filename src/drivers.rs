//! Outbound action sinks
//!
//! The dispatcher hands resolved [`HostAction`]s to an [`ActionSink`].
//! `MediaKeySink` performs the real OS key injection; `ConsoleSink` logs
//! actions instead, for `--simulate`, `--dry-run`, and tests.

use anyhow::{Context, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::router::HostAction;

/// Sink for resolved host actions
///
/// Note: implementations take `&self` so they can sit behind an `Arc`;
/// use interior mutability for state. Sends are fire-and-forget from the
/// dispatcher's perspective — errors are logged by the caller, never
/// propagated into dispatch logic.
pub trait ActionSink: Send + Sync {
    /// Sink name for logs (e.g. "media-keys", "dry-run")
    fn name(&self) -> &str;

    /// Perform the given action
    fn send(&self, action: HostAction) -> Result<()>;
}

/// Injects media/volume key taps into the host via enigo
pub struct MediaKeySink {
    enigo: Mutex<Enigo>,
}

impl MediaKeySink {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .context("Failed to initialize key injection backend")?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    /// Map an abstract action onto the host key that triggers it
    fn key_for(action: HostAction) -> Key {
        match action {
            HostAction::PlayPause => Key::MediaPlayPause,
            HostAction::PreviousTrack => Key::MediaPrevTrack,
            HostAction::NextTrack => Key::MediaNextTrack,
            HostAction::VolumeMute => Key::VolumeMute,
            HostAction::VolumeDown => Key::VolumeDown,
            HostAction::VolumeUp => Key::VolumeUp,
        }
    }
}

impl ActionSink for MediaKeySink {
    fn name(&self) -> &str {
        "media-keys"
    }

    fn send(&self, action: HostAction) -> Result<()> {
        let key = Self::key_for(action);
        debug!(action = %action, "Tapping host key");
        self.enigo
            .lock()
            .key(key, Direction::Click)
            .with_context(|| format!("Failed to inject key for {}", action))?;
        Ok(())
    }
}

/// ConsoleSink logs all actions to console/logs
///
/// This is useful for:
/// - Validating keyword dispatch without touching host media state
/// - Running against real hardware in `--dry-run`
/// - Tests that need to observe dispatched actions
pub struct ConsoleSink {
    name: String,
    /// Execution counter for debugging
    sent: Mutex<u64>,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(0),
        }
    }

    /// Number of actions sent so far
    pub fn sent_count(&self) -> u64 {
        *self.sent.lock()
    }
}

impl ActionSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, action: HostAction) -> Result<()> {
        let mut sent = self.sent.lock();
        *sent += 1;

        info!(
            "🎮 [{}] Sink '{}' → {} [#{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            action,
            *sent
        );

        Ok(())
    }
}
