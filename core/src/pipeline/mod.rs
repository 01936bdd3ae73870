// conductor/src/pipeline/mod.rs

//! The generic stage engine: `Pipeline<TData, Err>`, its construction, handler
//! registration and execution.

pub mod definition;
pub mod execution;
pub mod handlers;

pub use definition::Pipeline;
