//! DWScript evaluator core
//!
//! Tree-walking execution of DWScript programs: values and scopes,
//! expression and statement evaluation, user-defined calls with
//! design-by-contract checks, script exceptions and method dispatch.
//! Programs arrive as an already-parsed [`ast::Program`].

pub mod ast;
pub mod config;
pub mod error;
pub mod interp;
pub mod types;
pub mod util;

pub use ast::{Position, Program};
pub use config::EvalConfig;
pub use error::{Error, Result};
pub use interp::{Interpreter, Value};
