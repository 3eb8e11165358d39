use thiserror::Error;

use crate::component::ComponentError;
use crate::dispatcher::DispatchError;
use crate::eval::EvalError;
use crate::event::EventError;
use crate::preprocessor::PreprocessError;
use crate::runtime::RuntimeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
