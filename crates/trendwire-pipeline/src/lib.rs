//! Run orchestration for Trendwire.
//!
//! Drives the Collect, Analyze and Curate phases of daily and periodic runs,
//! applies the retry policy to every collaborator call, and reports each run
//! as a [`PipelineRunStats`].

pub mod collaborators;
pub mod curation;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod state_machine;
pub mod stats;

pub use collaborators::{AnalyzerOutput, Collector, ContentExtractor, DigestSink, SemanticAnalyzer};
pub use curation::{is_garbled_title, Curator};
pub use error::{CollaboratorError, ErrorKind, PhaseTransitionError, PipelineError, TimeoutError};
pub use orchestrator::{Collaborators, PipelineOrchestrator};
pub use retry::{
    default_classify, execute, run_blocking_with_timeout, run_with_timeout, RetryDecision,
    RetryPolicy, RetryState,
};
pub use state_machine::{PhaseMachine, PipelineState};
pub use stats::{PipelineRunStats, RunKind};
