pub mod context;
pub mod context_data;
pub mod step;

pub use context::Handler;
pub use context_data::ContextData;
pub use step::StageDef;
