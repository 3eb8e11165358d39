//! # Executor Events
//!
//! Everything the executor wants a host to know about is pushed as an
//! [`ExecutorEvent`] through the [`EventBus`](event_bus::EventBus). A host
//! (UI panel, CLI, test) subscribes once and renders whatever it needs:
//!
//! ```text
//! ┌──────────┐  ExecutorEvent  ┌──────────┐     ┌────────────┐
//! │ Executor │────────────────▶│ EventBus │────▶│ Subscriber │ (renderer, log panel, ...)
//! └──────────┘                 └──────────┘     └────────────┘
//! ```
//!
//! | Event | Meaning |
//! |---|---|
//! | `ComponentChanged` | a slot was switched on or off (0-based index) |
//! | `Output` | a human-readable line for the output panel |
//! | `LineChanged` | the line cursor moved, `None` when nothing executes |
//! | `StateChanged` | the run state changed |
//! | `Error` | the last error, `None` clears it |

pub mod emitter;
pub mod event_bus;

pub use emitter::EventEmitter;
pub use event_bus::{EventBus, EventError, EventReceiver, EventResult};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Run state of an executor.
///
/// `Paused` is reserved: no public operation reaches it today.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProgramState {
    #[default]
    Idle,
    Running,
    Paused,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
    Info,
    Error,
    Success,
}

impl OutputKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputKind::Info => "ℹ️",
            OutputKind::Error => "❌",
            OutputKind::Success => "✅",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    pub message: String,
    pub kind: OutputKind,
    pub timestamp: DateTime<Local>,
}

impl OutputEvent {
    pub fn new(message: impl Into<String>, kind: OutputKind) -> Self {
        Self {
            message: message.into(),
            kind,
            timestamp: Local::now(),
        }
    }

    /// Renders the line the way the output panel shows it, e.g.
    /// `[14:02:11] ✅ Kifaa nambari 1 kimewashwa`.
    pub fn formatted(&self, with_timestamp: bool) -> String {
        if with_timestamp {
            format!(
                "[{}] {} {}",
                self.timestamp.format("%H:%M:%S"),
                self.kind.prefix(),
                self.message
            )
        } else {
            format!("{} {}", self.kind.prefix(), self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    ComponentChanged { index: usize, is_enabled: bool },
    Output(OutputEvent),
    LineChanged(Option<usize>),
    StateChanged(ProgramState),
    Error(Option<String>),
}

impl ExecutorEvent {
    pub fn as_output(&self) -> Option<&OutputEvent> {
        match self {
            ExecutorEvent::Output(output) => Some(output),
            _ => None,
        }
    }
}
