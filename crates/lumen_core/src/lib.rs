//! Lumen Core - Analysis Engine Core
//!
//! The stateful half of the Lumen analysis engine: persisted feature
//! artifacts, the on-disk analysis cache, the background job queue and its
//! coordinator, and real-time mapping of analyzed events onto visual
//! parameters. The signal processing itself lives in `lumen_dsp`.
//!
//! # Architecture
//!
//! - [`AnalysisPipeline`] runs decode -> features -> events -> cache
//! - [`JobCoordinator`] drains a [`JobStore`] on a worker thread
//! - [`AnalysisCache`] is the JSON artifact store, first-write-wins
//! - [`evaluate`] samples a mapping at a playback time, pure and total

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod features;
pub mod job;
pub mod mapping;
pub mod pipeline;

pub use cache::{AnalysisCache, EventRecord};
pub use config::{AnalysisConfig, CoordinatorConfig};
pub use coordinator::{CoordinatorEvent, JobCoordinator, JobProcessor};
pub use error::{CoreError, CoreResult};
pub use features::{AnalysisRecord, AudioFeatureSet};
pub use job::{AnalysisJob, JobKind, JobStatus, JobStore, MemoryJobStore};
pub use mapping::{evaluate, modulate, AudioEventData, EventMapping, EventSource, Transform};
pub use pipeline::{AnalysisPipeline, PcmSource, PipelineProcessor, StemSeparator};
