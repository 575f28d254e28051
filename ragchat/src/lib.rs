//! Retrieval-augmented chat service.
//!
//! Answers chat messages with an LLM, grounding each answer in the closest chunks of an
//! ingested research table and in recent conversation history.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod middleware;
pub mod orchestrator;
pub mod retrieval;
pub mod state;
pub mod store;

pub use error::{EngineError, EngineResult};
pub use state::AppState;
