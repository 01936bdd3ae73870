// conductor/src/pipeline/execution.rs

//! `Pipeline::run()`: drives the stages in order and stops at the first failure.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::error::ConductorError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<ConductorError> + Send + Sync + 'static,
{
  /// Executes every stage against the shared `ctx_data`.
  ///
  /// Stage *i+1* starts only after all handlers of stage *i* succeeded. The
  /// first handler error is returned as-is and no later handler or stage runs.
  /// A stage with no handlers fails with `ConductorError::StageMissing`
  /// converted into `Err`.
  #[instrument(
        name = "Pipeline::run",
        skip_all,
        fields(
            context_data_type = %std::any::type_name::<TData>(),
            num_stages = self.stages.len(),
        ),
        err(Display)
    )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<(), Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    for (stage_idx, stage_def) in self.stages.iter().enumerate() {
      let stage_name = stage_def.name.as_str();
      let stage_span = span!(
        Level::INFO,
        "pipeline_stage_execution",
        stage_name = stage_name,
        stage_index = stage_idx
      );

      let on = self.on.get(stage_name).filter(|v| !v.is_empty());
      let after = self.after.get(stage_name).filter(|v| !v.is_empty());

      if on.is_none() && after.is_none() {
        event!(parent: &stage_span, Level::DEBUG, "Stage has no handlers.");
        return Err(Err::from(ConductorError::StageMissing {
          stage: stage_def.name.clone(),
        }));
      }

      for (phase, handlers) in [("on", on), ("after", after)] {
        let Some(handlers) = handlers else { continue };
        run_phase(phase, handlers, &ctx_data).instrument(stage_span.clone()).await?;
      }
      event!(parent: &stage_span, Level::DEBUG, "Stage finished successfully.");
    }

    event!(Level::DEBUG, "Pipeline execution completed successfully.");
    Ok(())
  }
}

async fn run_phase<TData, Err>(
  phase: &'static str,
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
) -> Result<(), Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + Send + Sync + 'static,
{
  event!(Level::TRACE, phase, "Executing handlers.");
  for (handler_idx, handler_fn) in handlers.iter().enumerate() {
    let handler_span = span!(Level::DEBUG, "stage_handler", phase, handler_index = handler_idx);
    if let Err(e) = handler_fn(ctx_data.clone()).instrument(handler_span).await {
      event!(Level::DEBUG, phase, "Stage handler failed.");
      return Err(e);
    }
  }
  Ok(())
}
