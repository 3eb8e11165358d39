//! # Command Dispatcher
//!
//! Turns one source line into exactly one effect. The grammar is small:
//!
//! | Line | Effect |
//! |---|---|
//! | `name = expression` | bind a variable |
//! | `washa(expression)` | switch a pin on |
//! | `zima(expression)` | switch a pin off |
//! | `subiri(expression)` | wait that many milliseconds |
//!
//! Recognition lives entirely in [`Command::parse`]; the scheduler only
//! ever talks to [`CommandDispatcher`], so the pattern matching can be
//! replaced by a real tokenizer without touching it.
//!
//! Waits are not slept here. [`CommandDispatcher::dispatch`] returns
//! [`Flow::Wait`] and the caller owns the timer, so the executor can cancel
//! it.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::component::ComponentError;
use crate::eval::{ContextError, EvalError, ExecutionContext, ExpressionEvaluator};
use crate::messages;

lazy_static! {
    static ref CALL: Regex = Regex::new(r"^([a-z]+)\((.*)\)$").unwrap();
}

/// Line prefixes that are never read as assignments.
const CONTROL_KEYWORDS: &[&str] = &["rudia", "kama", "if"];

/// Whether a line has anything to execute (not blank, not a `//` comment).
pub fn is_executable(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with("//")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Assign { name: String, expression: String },
    TurnOn(String),
    TurnOff(String),
    Wait(String),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line.contains('=') && !CONTROL_KEYWORDS.iter().any(|kw| line.starts_with(kw)) {
            if let Some((name, expression)) = line.split_once('=') {
                if !expression.contains('=') {
                    return Command::Assign {
                        name: name.trim().to_string(),
                        expression: expression.trim().to_string(),
                    };
                }
            }
        }

        if let Some(caps) = CALL.captures(line) {
            let argument = caps[2].to_string();
            match &caps[1] {
                "washa" => return Command::TurnOn(argument),
                "zima" => return Command::TurnOff(argument),
                "subiri" => return Command::Wait(argument),
                _ => {}
            }
        }

        Command::Unknown(line.to_string())
    }
}

/// What the caller has to do after a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Resume only after this long, then report the wait as elapsed.
    Wait(Duration),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Jina la kigezo si sahihi: {name}")]
    InvalidIdentifier { name: String },

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error(transparent)]
    InvalidPin(#[from] ComponentError),

    #[error("Muda wa kusubiri si sahihi: {value}")]
    InvalidDuration { value: f64 },

    #[error("Amri haijulikani: {line}")]
    UnknownCommand { line: String },
}

impl From<ContextError> for DispatchError {
    fn from(error: ContextError) -> Self {
        match error {
            ContextError::InvalidIdentifier { name } => DispatchError::InvalidIdentifier { name },
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Default, Clone)]
pub struct CommandDispatcher {
    evaluator: ExpressionEvaluator,
    max_wait: Option<Duration>,
}

impl CommandDispatcher {
    pub fn new(max_wait: Option<Duration>) -> Self {
        Self {
            evaluator: ExpressionEvaluator::new(),
            max_wait,
        }
    }

    /// Executes one line. Failures are reported as an error output before
    /// being returned.
    pub fn dispatch(&self, line: &str, context: &mut ExecutionContext) -> DispatchResult<Flow> {
        let command = Command::parse(line);
        debug!("Dispatching {:?}", command);
        let result = self.apply(command, context);
        if let Err(e) = &result {
            context.events.error(e.to_string());
        }
        result
    }

    fn apply(&self, command: Command, context: &mut ExecutionContext) -> DispatchResult<Flow> {
        match command {
            Command::Assign { name, expression } => {
                if !crate::eval::is_identifier(&name) {
                    return Err(DispatchError::InvalidIdentifier { name });
                }
                let value = self.evaluator.evaluate(&expression, &context.variables)?;
                context.variables.assign(&name, value)?;
                debug!("{} = {}", name, value);
                Ok(Flow::Continue)
            }
            Command::TurnOn(argument) => self.switch(&argument, true, context),
            Command::TurnOff(argument) => self.switch(&argument, false, context),
            Command::Wait(argument) => {
                let millis = self.evaluator.evaluate(&argument, &context.variables)?;
                let duration = self.wait_duration(millis)?;
                context.events.info(messages::waiting(millis));
                Ok(Flow::Wait(duration))
            }
            Command::Unknown(line) => Err(DispatchError::UnknownCommand { line }),
        }
    }

    fn switch(
        &self,
        argument: &str,
        is_enabled: bool,
        context: &mut ExecutionContext,
    ) -> DispatchResult<Flow> {
        let value = self.evaluator.evaluate(argument, &context.variables)?;
        let index = context.board.index_for_pin(value)?;
        context.board.set_enabled(index, is_enabled)?;
        context.events.component_changed(index, is_enabled);
        let message = if is_enabled {
            messages::turned_on(index + 1)
        } else {
            messages::turned_off(index + 1)
        };
        context.events.success(message);
        Ok(Flow::Continue)
    }

    fn wait_duration(&self, millis: f64) -> DispatchResult<Duration> {
        let invalid = DispatchError::InvalidDuration { value: millis };
        let nanos = (millis * 1_000_000.0).round();
        if !nanos.is_finite() || nanos < 0.0 || nanos >= u64::MAX as f64 {
            return Err(invalid);
        }
        let duration = Duration::from_nanos(nanos as u64);
        match self.max_wait {
            Some(max) if duration > max => Err(invalid),
            _ => Ok(duration),
        }
    }
}
