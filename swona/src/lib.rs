//! Swona - a small expression language compiled to bytecode
//!
//! # Pipeline
//!
//! ```text
//! Source → Lexer → Tokens
//!               ↓
//!          Parser → Expression
//!               ↓
//!          Typecheck → TypedExpression (names resolved to bindings)
//!               ↓
//!          Optimizer → TypedExpression (constants folded)
//!               ↓
//!          Translator → BasicBlockGraph (stack IR)
//!               ↓
//!          Peephole → BasicBlockGraph
//!               ↓
//!          Bytecode → CodeSegment (stack depths verified)
//!               ↓
//!          VM → Value
//! ```
//!
//! [`Evaluator`] drives the pipeline and keeps global state between
//! evaluations.

pub mod ast;
pub mod bytecode;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod ir;
pub mod lexer;
pub mod location;
pub mod optimizer;
pub mod parser;
pub mod peephole;
pub mod runtime;
pub mod translator;
pub mod typecheck;
pub mod typed;
pub mod types;
pub mod value;
pub mod vm;

pub use ast::{BinaryOp, Expression, FunctionDefinition, RelationalOp};
pub use error::{CompileError, Error, ErrorKind, InternalError, Result, RuntimeError};
pub use evaluator::{EvaluationResult, Evaluator, EvaluatorOptions};
pub use location::SourceLocation;
pub use runtime::register_runtime_functions;
pub use types::{FunctionType, Type};
pub use value::{ArrayRef, Function, NativeFunction, Value};
