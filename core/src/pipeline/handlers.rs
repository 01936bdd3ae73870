// conductor/src/pipeline/handlers.rs

//! Registration of `on` and `after` handlers for pipeline stages.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::error::ConductorError;
use crate::pipeline::definition::Pipeline;
use std::future::Future;

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<ConductorError> + Send + Sync + 'static,
{
  /// Registers the main handler of a stage.
  ///
  /// The handler may return any error type convertible into the pipeline's `Err`.
  pub fn on_root<F, UserErr>(
    &mut self,
    stage_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<(), UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_stage_exists(stage_name);
    let handler = box_handler(handler_fn);
    self.on.entry(stage_name.to_string()).or_default().push(handler);
  }

  /// Registers a handler that runs once the stage's `on` handlers succeeded.
  pub fn after_root<F, UserErr>(
    &mut self,
    stage_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<(), UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_stage_exists(stage_name);
    let handler = box_handler(handler_fn);
    self.after.entry(stage_name.to_string()).or_default().push(handler);
  }
}

fn box_handler<TData, Err, F, UserErr>(
  handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
) -> Handler<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: Send + 'static,
  F: Future<Output = Result<(), UserErr>> + Send + 'static,
  UserErr: Into<Err> + Send + Sync + 'static,
{
  Box::new(move |ctx_data| {
    let user_fut = handler_fn(ctx_data);
    Box::pin(async move { user_fut.await.map_err(Into::into) })
  })
}
