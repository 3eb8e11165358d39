//! Expression evaluation and the per-run execution context.

pub mod context;
pub mod expression;

pub use context::{is_identifier, ContextError, ExecutionContext, VariableStore};
pub use expression::{EvalError, EvalResult, ExpressionEvaluator};
