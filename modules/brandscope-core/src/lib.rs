pub mod aggregator;
pub mod config;
pub mod disambiguator;
pub mod duel;
pub mod error;
pub mod executor;
pub mod file_config;
pub mod memo;
pub mod pipeline;
pub mod planner;
pub mod quality;
pub mod scoring;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::AppConfig;
pub use error::{EvaluationError, PipelineError, PipelineResult, ProviderError, ValidationError};
pub use file_config::{load_config, FileConfig};
pub use memo::{Cached, MemoCache, MemoKey};
pub use pipeline::{PipelineCaches, ReputationPipeline};
pub use scoring::curve::{apply_discriminant_curve, DiscriminantCurve};
pub use traits::{SearchProvider, StructuredLlm};
pub use types::*;
