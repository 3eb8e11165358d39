use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::component::ComponentBoard;
use crate::event::EventEmitter;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Whether `name` may be used as a variable name.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Jina la kigezo si sahihi: {name}")]
    InvalidIdentifier { name: String },
}

/// Variables of one program run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    values: BTreeMap<String, f64>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Binds `name` to `value`, returning the previous value.
    pub fn assign(&mut self, name: &str, value: f64) -> Result<Option<f64>, ContextError> {
        if !is_identifier(name) {
            return Err(ContextError::InvalidIdentifier {
                name: name.to_string(),
            });
        }
        Ok(self.values.insert(name.to_string(), value))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// The mutable world a command runs against.
pub struct ExecutionContext {
    pub variables: VariableStore,
    pub board: ComponentBoard,
    pub events: EventEmitter,
}

impl ExecutionContext {
    pub fn new(board: ComponentBoard, events: EventEmitter) -> Self {
        Self {
            variables: VariableStore::new(),
            board,
            events,
        }
    }
}
