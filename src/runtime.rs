//! # Execution Scheduler
//!
//! [`Executor`] owns one program run at a time. A run is a single spawned
//! task that walks the preprocessed lines, one per step:
//!
//! ```text
//!            start(source)
//!   ┌──────┐ ───────────────▶ ┌─────────┐
//!   │ Idle │                  │ Running │ ──┐ step: dispatch line i,
//!   └──────┘ ◀─────────────── └─────────┘ ◀─┘ sleep on subiri, yield
//!        completed / failed / stop()
//! ```
//!
//! All mutable state lives in [`Machine`] behind one async mutex that is
//! never held across a sleep. Every step re-checks under that lock that its
//! run is still the current one before dispatching, so `stop()` wins even
//! against a step that is already scheduled.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::component::{ComponentBoard, ComponentState};
use crate::config::{ConfigUpdate, ExecutorConfig};
use crate::dispatcher::{is_executable, CommandDispatcher, DispatchError, DispatchResult, Flow};
use crate::eval::{ExecutionContext, VariableStore};
use crate::event::{EventBus, EventEmitter, EventError, EventReceiver, ProgramState};
use crate::messages;
use crate::preprocessor::{BlockPreprocessor, PreprocessError, Preprocessor};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("Executor state channel closed")]
    StateChannelClosed,
    #[error("A program is already running")]
    AlreadyRunning,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Outcome of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Restart,
    Wait(Duration),
    Done,
}

struct Program {
    lines: Vec<String>,
    /// A program without executable lines never replays.
    replayable: bool,
}

struct Machine {
    state: ProgramState,
    current_line: Option<usize>,
    generation: u64,
    config: ExecutorConfig,
    dispatcher: CommandDispatcher,
    preprocessor: BlockPreprocessor,
    context: ExecutionContext,
    state_tx: watch::Sender<ProgramState>,
}

impl Machine {
    fn owns(&self, generation: u64) -> bool {
        self.state == ProgramState::Running && self.generation == generation
    }

    fn set_state(&mut self, state: ProgramState) {
        self.state = state;
        self.state_tx.send_replace(state);
        self.context.events.state_changed(state);
    }

    fn set_line(&mut self, line: Option<usize>) {
        self.current_line = line;
        self.context.events.line_changed(line);
    }

    fn dispatch(&mut self, line: &str) -> DispatchResult<Flow> {
        self.dispatcher.dispatch(line, &mut self.context)
    }

    fn step(&mut self, program: &Program, index: usize, generation: u64) -> Step {
        if self.generation != generation {
            return Step::Done;
        }
        if self.state != ProgramState::Running {
            self.set_line(None);
            return Step::Done;
        }

        let Some(raw) = program.lines.get(index) else {
            if self.config.loop_program && program.replayable {
                debug!("Program finished, replaying");
                self.set_line(None);
                return Step::Restart;
            }
            info!("Program completed");
            self.context.events.success(messages::PROGRAM_COMPLETED);
            self.set_state(ProgramState::Idle);
            self.set_line(None);
            return Step::Done;
        };

        self.set_line(Some(index));
        let line = raw.trim();
        if !is_executable(line) {
            return Step::Next;
        }

        debug!("Executing line {}: {}", index, line);
        self.context.events.info(messages::executing(line));
        match self.dispatch(line) {
            Ok(Flow::Continue) => Step::Next,
            Ok(Flow::Wait(duration)) => Step::Wait(duration),
            Err(e) => {
                warn!("Program aborted at line {}: {}", index, e);
                self.context.events.report_error(Some(e.to_string()));
                self.context.events.info(messages::aborted_at(index + 1));
                self.set_state(ProgramState::Idle);
                self.set_line(None);
                Step::Done
            }
        }
    }
}

struct ExecutorInner {
    machine: Mutex<Machine>,
    event_bus: Arc<EventBus>,
    state_rx: watch::Receiver<ProgramState>,
    task_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ExecutorInner {
    fn replace_task(&self, handle: Option<JoinHandle<()>>) {
        let mut slot = self
            .task_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = handle;
    }
}

async fn run_program(inner: Arc<ExecutorInner>, program: Program, generation: u64) {
    let mut index = 0;
    loop {
        let step = inner.machine.lock().await.step(&program, index, generation);
        match step {
            Step::Next => index += 1,
            Step::Restart => index = 0,
            Step::Wait(duration) => {
                tokio::time::sleep(duration).await;
                let mut machine = inner.machine.lock().await;
                if !machine.owns(generation) {
                    return;
                }
                machine.context.events.info(messages::WAIT_ELAPSED);
                index += 1;
            }
            Step::Done => return,
        }
        tokio::task::yield_now().await;
    }
}

/// Runs programs against one simulated component board.
///
/// Executors are independent; each owns its board, variables and event bus.
/// Dropping an executor cancels its pending run.
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let (state_tx, state_rx) = watch::channel(ProgramState::Idle);
        let context = ExecutionContext::new(
            ComponentBoard::new(config.component_count),
            EventEmitter::new(event_bus.clone(), config.timestamps),
        );
        let machine = Machine {
            state: ProgramState::Idle,
            current_line: None,
            generation: 0,
            dispatcher: CommandDispatcher::new(config.max_wait),
            preprocessor: BlockPreprocessor::new(config.max_expanded_lines),
            config,
            context,
            state_tx,
        };
        Self {
            inner: Arc::new(ExecutorInner {
                machine: Mutex::new(machine),
                event_bus,
                state_rx,
                task_handle: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Starts running `source` on a board with every slot switched off.
    /// Does nothing while a program is already running.
    pub async fn start(&self, source: &str) -> RuntimeResult<()> {
        self.try_start(source).await.map(|_| ())
    }

    /// Like [`start`](Self::start), but reports whether a new run began.
    async fn try_start(&self, source: &str) -> RuntimeResult<bool> {
        let mut machine = self.inner.machine.lock().await;
        if machine.state != ProgramState::Idle {
            debug!("Start ignored, executor is {}", machine.state);
            return Ok(false);
        }

        let lines = match machine.preprocessor.process(source) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Preprocessing failed: {}", e);
                machine.context.events.error(e.to_string());
                machine.context.events.report_error(Some(e.to_string()));
                return Err(e.into());
            }
        };

        machine.generation += 1;
        let generation = machine.generation;
        machine.context.variables.clear();
        machine.context.events.clear_log();
        machine.context.board.reset();
        for index in 0..machine.context.board.len() {
            machine.context.events.component_changed(index, false);
        }
        machine.set_line(None);
        machine.context.events.report_error(None);
        machine.context.events.info(messages::PROGRAM_STARTING);
        machine.set_state(ProgramState::Running);
        info!("Program started with {} lines", lines.len());

        let program = Program {
            replayable: lines.iter().any(|line| is_executable(line)),
            lines,
        };
        let handle = tokio::spawn(run_program(self.inner.clone(), program, generation));
        self.inner.replace_task(Some(handle));
        Ok(true)
    }

    /// Cancels the current run, including an outstanding wait.
    pub async fn stop(&self) {
        self.inner.replace_task(None);
        let mut machine = self.inner.machine.lock().await;
        machine.generation += 1;
        machine.set_state(ProgramState::Idle);
        machine.set_line(None);
        machine.context.events.info(messages::PROGRAM_STOPPED);
        info!("Program stopped");
    }

    pub async fn reset_components(&self) {
        let mut machine = self.inner.machine.lock().await;
        machine.context.board.reset();
        for index in 0..machine.context.board.len() {
            machine.context.events.component_changed(index, false);
        }
        machine.context.events.info(messages::COMPONENTS_RESET);
    }

    /// Executes one line outside the scheduled program. The run state and
    /// line cursor are left alone.
    pub async fn execute_direct_command(&self, command: &str) -> RuntimeResult<()> {
        let line = command.trim();
        if line.is_empty() {
            return Ok(());
        }

        let mut machine = self.inner.machine.lock().await;
        machine.context.events.info(messages::direct_command(line));
        if !is_executable(line) {
            return Ok(());
        }

        match machine.dispatch(line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Wait(duration)) => {
                drop(machine);
                tokio::time::sleep(duration).await;
                machine = self.inner.machine.lock().await;
                machine.context.events.info(messages::WAIT_ELAPSED);
            }
            Err(e) => {
                machine.context.events.report_error(Some(e.to_string()));
                return Err(e.into());
            }
        }
        machine.context.events.report_error(None);
        Ok(())
    }

    pub async fn update_config(&self, update: ConfigUpdate) {
        let mut machine = self.inner.machine.lock().await;
        machine.config.apply(&update);
        if let Some(count) = update.component_count {
            machine.context.board.resize(count);
        }
        debug!("Config updated: {:?}", machine.config);
    }

    /// Runs `source` to completion and returns the formatted output of the
    /// run. Never returns for a looping program unless it is stopped or
    /// fails. Fails with [`RuntimeError::AlreadyRunning`] instead of joining
    /// a run that is already in progress.
    pub async fn run(&self, source: &str) -> RuntimeResult<String> {
        if !self.try_start(source).await? {
            return Err(RuntimeError::AlreadyRunning);
        }
        self.wait_until_idle().await?;
        Ok(self.output_log().await.join("\n"))
    }

    pub async fn wait_until_idle(&self) -> RuntimeResult<()> {
        let mut state_rx = self.inner.state_rx.clone();
        state_rx
            .wait_for(|state| *state == ProgramState::Idle)
            .await
            .map(|_| ())
            .map_err(|_| RuntimeError::StateChannelClosed)
    }

    pub fn state(&self) -> ProgramState {
        *self.inner.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ProgramState> {
        self.inner.state_rx.clone()
    }

    pub async fn current_line(&self) -> Option<usize> {
        self.inner.machine.lock().await.current_line
    }

    pub async fn components(&self) -> Vec<ComponentState> {
        self.inner.machine.lock().await.context.board.slots().to_vec()
    }

    pub async fn variables(&self) -> VariableStore {
        self.inner.machine.lock().await.context.variables.clone()
    }

    pub async fn config(&self) -> ExecutorConfig {
        self.inner.machine.lock().await.config.clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.event_bus.subscribe()
    }

    /// Formatted output lines since the last `start`.
    pub async fn output_log(&self) -> Vec<String> {
        self.inner.machine.lock().await.context.events.log().to_vec()
    }

    /// Cancels any pending run without emitting events.
    pub fn destroy(&self) {
        self.inner.replace_task(None);
        if let Ok(mut machine) = self.inner.machine.try_lock() {
            machine.generation += 1;
            machine.state = ProgramState::Idle;
            machine.current_line = None;
            machine.state_tx.send_replace(ProgramState::Idle);
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.destroy();
    }
}
