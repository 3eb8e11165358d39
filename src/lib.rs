//! # Umeme
//!
//! A small command engine for a Swahili-keyword electronics language. A
//! program is a list of lines:
//!
//! ```text
//! kasi = 2
//! rudia(3) {
//!     washa(kasi)
//!     subiri(500)
//!     zima(kasi)
//!     subiri(500)
//! }
//! ```
//!
//! `washa(pin)` switches a component on, `zima(pin)` switches it off,
//! `subiri(ms)` waits and `name = expression` binds a variable. Blocks of
//! `rudia(N) { ... }` are unrolled before execution.
//!
//! The [`Executor`] runs one program at a time against a simulated
//! [`ComponentBoard`](component::ComponentBoard) and reports everything it
//! does as [`ExecutorEvent`]s:
//!
//! ```no_run
//! use umeme::{Executor, ExecutorConfig};
//!
//! # async fn demo() -> Result<(), umeme::Error> {
//! let executor = Executor::new(ExecutorConfig::default());
//! let output = executor.run("washa(1)\nsubiri(100)\nzima(1)").await?;
//! println!("{}", output);
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod event;
pub mod messages;
pub mod preprocessor;
pub mod runtime;

pub use component::{ComponentBoard, ComponentError, ComponentState, ComponentType};
pub use config::{ConfigUpdate, ExecutorConfig};
pub use dispatcher::{Command, CommandDispatcher, DispatchError, DispatchResult, Flow};
pub use error::*;
pub use eval::{EvalError, EvalResult, ExpressionEvaluator, VariableStore};
pub use event::{
    EventBus, EventReceiver, ExecutorEvent, OutputEvent, OutputKind, ProgramState,
};
pub use preprocessor::{BlockPreprocessor, PreprocessError, PreprocessResult, Preprocessor};
pub use runtime::{Executor, RuntimeError, RuntimeResult};

/// The starter program shown to new learners.
pub const EXAMPLE_CODE: &str = "// Mfano: Washa na Zima LED kwa mara 3

rudia(3) {
  washa(1)
  subiri(500)
  zima(1)
  subiri(500)
}
";
