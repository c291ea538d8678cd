//! Serial deck driver
//!
//! Owns the single live serial connection to the controller deck: opening,
//! the reader task that turns inbound bytes into protocol lines, and
//! teardown on error or disconnect. Recovery is deliberately passive — a
//! lost link just reverts to idle and the discovery poller re-establishes
//! it on its next scan.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use crate::protocol::LineAssembler;

/// A discoverable serial endpoint
///
/// Produced fresh on every scan; holds no open resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable address, e.g. `/dev/tty.usbserial-1420` or `COM4`
    pub path: String,
    /// Bus-assigned product name, falling back to the path
    pub name: String,
}

impl DeviceDescriptor {
    /// Case-sensitive substring match against name or address
    pub fn matches(&self, keyword: &str) -> bool {
        self.name.contains(keyword) || self.path.contains(keyword)
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No connection; the poller may attempt one
    Idle,
    /// An open is in flight; further attempts are rejected, not queued
    Opening { path: String },
    /// A live connection; inbound bytes flow to the line parser
    Connected { descriptor: DeviceDescriptor },
}

impl LinkState {
    pub fn is_idle(&self) -> bool {
        matches!(self, LinkState::Idle)
    }
}

/// Event from the deck connection
#[derive(Debug, Clone)]
pub enum DeckEvent {
    /// One complete protocol line
    Line(String),
    /// The connection ended; state is back to idle
    Disconnected { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("connect rejected: open already in flight for {0}")]
    Busy(String),
    #[error("failed to open {path}: {detail:#}")]
    OpenFailed {
        path: String,
        detail: anyhow::Error,
    },
}

/// Inbound byte stream of one open connection
pub type DeckStream = Box<dyn AsyncRead + Send + Unpin>;

/// Seam for opening a serial device
///
/// Production uses [`SerialOpener`]; tests substitute in-memory streams.
#[async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self, path: &str, baud_rate: u32) -> Result<DeckStream>;
}

/// Opens real serial ports via tokio-serial
pub struct SerialOpener;

#[async_trait]
impl PortOpener for SerialOpener {
    async fn open(&self, path: &str, baud_rate: u32) -> Result<DeckStream> {
        let stream = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .with_context(|| format!("Failed to open serial port {}", path))?;
        Ok(Box::new(stream))
    }
}

struct LinkInner {
    state: LinkState,
    /// Bumped on every connect claim and disconnect, so the reader task of a
    /// replaced connection cannot clobber its successor's state
    generation: u64,
}

/// Deck driver managing the single live connection
///
/// All methods take `&self` so the driver can be shared behind an `Arc`
/// between the discovery poller and the event loop.
pub struct DeckDriver {
    opener: Arc<dyn PortOpener>,
    baud_rate: u32,
    link: Arc<Mutex<LinkInner>>,
    /// Event sender handed to each reader task
    event_tx: mpsc::Sender<DeckEvent>,
    /// Event receiver, until taken by the consumer
    event_rx: Mutex<Option<mpsc::Receiver<DeckEvent>>>,
    /// Status mirror for presentation collaborators
    status_tx: watch::Sender<LinkState>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DeckDriver {
    pub fn new(baud_rate: u32, opener: Arc<dyn PortOpener>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);
        let (status_tx, _) = watch::channel(LinkState::Idle);

        Self {
            opener,
            baud_rate,
            link: Arc::new(Mutex::new(LinkInner {
                state: LinkState::Idle,
                generation: 0,
            })),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            status_tx,
            reader: Mutex::new(None),
        }
    }

    /// Driver backed by real serial ports
    pub fn with_serial(baud_rate: u32) -> Self {
        Self::new(baud_rate, Arc::new(SerialOpener))
    }

    /// Take the event receiver (can only be taken once)
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<DeckEvent>> {
        self.event_rx.lock().take()
    }

    /// Current connection state
    pub fn state(&self) -> LinkState {
        self.link.lock().state.clone()
    }

    /// Watch channel mirroring [`Self::state`] for display surfaces
    pub fn status_rx(&self) -> watch::Receiver<LinkState> {
        self.status_tx.subscribe()
    }

    /// Open a connection to the given device
    ///
    /// Closes any existing connection first. Rejects (never queues) a call
    /// made while another open is in flight. On failure the driver returns
    /// to idle and schedules no retry of its own — the next discovery scan
    /// is the retry.
    pub async fn connect(&self, descriptor: DeviceDescriptor) -> Result<(), DeckError> {
        let generation = {
            let mut link = self.link.lock();
            if let LinkState::Opening { path } = &link.state {
                return Err(DeckError::Busy(path.clone()));
            }
            let previous = std::mem::replace(
                &mut link.state,
                LinkState::Opening {
                    path: descriptor.path.clone(),
                },
            );
            link.generation += 1;
            if let LinkState::Connected { descriptor: old } = previous {
                info!("🔌 Closing {} to open {}", old.path, descriptor.path);
            }
            link.generation
        };

        // The old reader (if any) must die before the new link goes live.
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        self.publish_status();

        info!("🔗 Opening {} @ {} baud", descriptor.path, self.baud_rate);

        match self.opener.open(&descriptor.path, self.baud_rate).await {
            Ok(stream) => {
                {
                    let mut link = self.link.lock();
                    if link.generation != generation {
                        // A disconnect raced the open; drop the fresh stream.
                        debug!("Open of {} superseded, discarding", descriptor.path);
                        return Ok(());
                    }
                    link.state = LinkState::Connected {
                        descriptor: descriptor.clone(),
                    };
                }

                let handle = tokio::spawn(read_loop(
                    stream,
                    descriptor.path.clone(),
                    generation,
                    self.link.clone(),
                    self.event_tx.clone(),
                    self.status_tx.clone(),
                ));
                *self.reader.lock() = Some(handle);
                self.publish_status();

                info!("✅ {} : open", descriptor.path);
                Ok(())
            }
            Err(detail) => {
                {
                    let mut link = self.link.lock();
                    if link.generation == generation {
                        link.state = LinkState::Idle;
                    }
                }
                self.publish_status();
                Err(DeckError::OpenFailed {
                    path: descriptor.path,
                    detail,
                })
            }
        }
    }

    /// Close the current connection, if any
    pub fn disconnect(&self) {
        let had_link = {
            let mut link = self.link.lock();
            let had_link = !link.state.is_idle();
            link.state = LinkState::Idle;
            link.generation += 1;
            had_link
        };

        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }

        if had_link {
            self.publish_status();
            info!("🔌 Link closed");
        }
    }

    fn publish_status(&self) {
        let state = self.link.lock().state.clone();
        self.status_tx.send_replace(state);
    }
}

/// Reader task for one connection
///
/// Feeds inbound chunks through a fresh [`LineAssembler`] and forwards the
/// completed lines in order. On end-of-stream or read error it reverts the
/// link to idle — unless a newer connection already took over — and emits a
/// disconnect event. The assembler dies here, so an unterminated trailing
/// fragment is dropped.
async fn read_loop(
    mut stream: DeckStream,
    path: String,
    generation: u64,
    link: Arc<Mutex<LinkInner>>,
    event_tx: mpsc::Sender<DeckEvent>,
    status_tx: watch::Sender<LinkState>,
) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 512];

    let reason = loop {
        match stream.read(&mut buf).await {
            Ok(0) => break "end of stream".to_string(),
            Ok(n) => {
                trace!("{} : {} byte(s)", path, n);
                for line in assembler.push(&buf[..n]) {
                    if event_tx.send(DeckEvent::Line(line)).await.is_err() {
                        // Consumer is gone; the process is shutting down.
                        return;
                    }
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    if assembler.pending() > 0 {
        debug!(
            "{} : dropping {} unterminated byte(s)",
            path,
            assembler.pending()
        );
    }

    let stale = {
        let mut guard = link.lock();
        if guard.generation == generation {
            guard.state = LinkState::Idle;
            false
        } else {
            true
        }
    };
    if stale {
        return;
    }
    status_tx.send_replace(LinkState::Idle);

    warn!("⚠️  {} : disconnected ({})", path, reason);
    let _ = event_tx.send(DeckEvent::Disconnected { path, reason }).await;
}
