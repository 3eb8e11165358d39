use std::sync::Arc;

use tracing::{debug, warn};

use super::{EventBus, ExecutorEvent, OutputEvent, OutputKind, ProgramState};

/// Publishes executor events and keeps the formatted output log of the
/// current run.
pub struct EventEmitter {
    bus: Arc<EventBus>,
    log: Vec<String>,
    timestamps: bool,
}

impl EventEmitter {
    pub fn new(bus: Arc<EventBus>, timestamps: bool) -> Self {
        Self {
            bus,
            log: Vec::new(),
            timestamps,
        }
    }

    fn emit(&self, event: ExecutorEvent) {
        if let Err(e) = self.bus.publish(event) {
            warn!("Failed to publish executor event: {}", e);
        }
    }

    pub fn output(&mut self, message: impl Into<String>, kind: OutputKind) {
        let event = OutputEvent::new(message, kind);
        debug!("[{}] {}", kind, event.message);
        self.log.push(event.formatted(self.timestamps));
        self.emit(ExecutorEvent::Output(event));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.output(message, OutputKind::Info);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.output(message, OutputKind::Success);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.output(message, OutputKind::Error);
    }

    pub fn component_changed(&self, index: usize, is_enabled: bool) {
        self.emit(ExecutorEvent::ComponentChanged { index, is_enabled });
    }

    pub fn line_changed(&self, line: Option<usize>) {
        self.emit(ExecutorEvent::LineChanged(line));
    }

    pub fn state_changed(&self, state: ProgramState) {
        self.emit(ExecutorEvent::StateChanged(state));
    }

    /// Reports the last error to the host; `None` clears it.
    pub fn report_error(&self, message: Option<String>) {
        self.emit(ExecutorEvent::Error(message));
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}
