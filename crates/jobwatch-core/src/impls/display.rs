//! DisplaySink の実装
//!
//! - `RecordingDisplay`: 受け取った操作をすべて記録する（テスト用）
//! - `TerminalDisplay`: 任意の `Write` に書き出す（CLI 用）

use std::collections::HashSet;
use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::domain::DisplayId;
use crate::ports::DisplaySink;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Shown(String),
    Opened { id: DisplayId, artifact: String },
    Updated { id: DisplayId, artifact: String },
    Released(DisplayId),
}

#[derive(Default)]
struct Recorded {
    events: Vec<DisplayEvent>,
    open: HashSet<DisplayId>,
}

/// Keeps every display operation in order.
#[derive(Default)]
pub struct RecordingDisplay {
    recorded: Mutex<Recorded>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.lock().events.clone()
    }

    /// Handles opened and not yet released.
    pub fn open_handles(&self) -> usize {
        self.lock().open.len()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySink for RecordingDisplay {
    fn show(&self, artifact: &str) {
        self.lock()
            .events
            .push(DisplayEvent::Shown(artifact.to_string()));
    }

    fn open(&self, initial: &str) -> DisplayId {
        let id = DisplayId::generate();
        let mut recorded = self.lock();
        recorded.open.insert(id);
        recorded.events.push(DisplayEvent::Opened {
            id,
            artifact: initial.to_string(),
        });
        id
    }

    fn update(&self, id: &DisplayId, artifact: &str) {
        self.lock().events.push(DisplayEvent::Updated {
            id: *id,
            artifact: artifact.to_string(),
        });
    }

    fn release(&self, id: DisplayId) {
        let mut recorded = self.lock();
        recorded.open.remove(&id);
        recorded.events.push(DisplayEvent::Released(id));
    }
}

/// Writes artifacts to a stream. Updates redraw the screen when `clear_on_update`.
pub struct TerminalDisplay<W: Write + Send> {
    out: Mutex<W>,
    clear_on_update: bool,
}

impl TerminalDisplay<io::Stdout> {
    /// Stdout; the screen is cleared between updates only on a TTY.
    pub fn stdout() -> Self {
        let stdout = io::stdout();
        let clear_on_update = stdout.is_terminal();
        Self::new(stdout, clear_on_update)
    }
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W, clear_on_update: bool) -> Self {
        Self {
            out: Mutex::new(out),
            clear_on_update,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, clear: bool, artifact: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let result = (|| {
            if clear {
                out.write_all(CLEAR_SCREEN.as_bytes())?;
            }
            writeln!(out, "{artifact}")?;
            out.flush()
        })();
        if let Err(err) = result {
            warn!(error = %err, "failed to write to display");
        }
    }
}

impl<W: Write + Send> DisplaySink for TerminalDisplay<W> {
    fn show(&self, artifact: &str) {
        self.write(false, artifact);
    }

    fn open(&self, initial: &str) -> DisplayId {
        self.write(false, initial);
        DisplayId::generate()
    }

    fn update(&self, _id: &DisplayId, artifact: &str) {
        if self.clear_on_update {
            self.write(true, artifact);
        } else {
            self.write(false, &format!("\n{artifact}"));
        }
    }

    fn release(&self, _id: DisplayId) {}
}
