//! Multi-model request orchestrator for gemlink.
//!
//! Given a prompt and an image-intent flag, the [`Orchestrator`] picks candidate
//! models, streams a response from each in turn, classifies failures, retries or falls
//! back, and always resolves to a single [`NormalizedResult`].
//!
//! # Example
//!
//! ```no_run
//! use gemlink_abstraction::{Credentials, GenerationRequest};
//! use gemlink_models::GeminiClient;
//! use gemlink_orchestrator::{Orchestrator, OrchestratorConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> gemlink_orchestrator::Result<()> {
//! let orchestrator = Orchestrator::new(Arc::new(GeminiClient::new()), OrchestratorConfig::default())?;
//! let result = orchestrator
//!     .generate(&GenerationRequest::text("Hello"), &Credentials::new("api-key"))
//!     .await;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod candidates;
pub mod classifier;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod reassembler;

pub use candidates::CandidateQueue;
pub use classifier::{ClassifiedError, ErrorCategory, classify, classify_failure};
pub use config::{ModelPreference, OrchestratorConfig, default_preferred_models};
pub use error::{OrchestrationError, Result};
pub use normalizer::{AttemptOutcome, EncodedImage, normalize, user_message};
pub use orchestrator::{GenerationReport, ModelAttempt, ModelOutcome, Orchestrator};
pub use reassembler::BinaryReassembler;

pub use gemlink_abstraction::NormalizedResult;
