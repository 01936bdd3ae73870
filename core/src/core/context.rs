// conductor/src/core/context.rs

//! The `Handler<TData, Err>` type for stage handlers operating on `ContextData<TData>`.

use crate::core::context_data::ContextData;
use std::future::Future;
use std::pin::Pin;

/// A boxed stage handler.
///
/// A handler takes a clone of the run's `ContextData<TData>` and returns a future
/// resolving to `Result<(), Err>`. Handlers are responsible for:
/// 1. Taking `.read()` / `.write()` guards only for as long as they touch the state.
/// 2. **Dropping every guard before the next `.await`.**
pub type Handler<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;
