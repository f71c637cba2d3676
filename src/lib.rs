pub mod bot;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod parsing;
pub mod pipeline;
pub mod plot;
pub mod preprocess;

pub use error::{PipelineError, Stage};
pub use pipeline::{handle, run, PipelineRequest, PipelineResponse, PipelineRun, Status};
