//! Backend implementations for gemlink.
//!
//! This crate provides concrete implementations of the `GenerativeBackend` trait and
//! the model catalog used to pick candidates.
//!
//! # Backends
//!
//! - **Gemini**: Google's Gemini REST API (API key required)
//! - **Scripted**: Canned replies for testing and development

pub mod catalog;
pub mod gemini;
pub mod scripted;

pub use catalog::{CachedCatalog, CatalogResolver, ModelCatalog};
pub use gemini::{DEFAULT_BASE_URL, GeminiClient};
pub use scripted::{CallKind, ScriptedBackend, ScriptedCall, ScriptedReply};
