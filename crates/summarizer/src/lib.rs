//! Summarization pipeline.
//!
//! Turns a forwarded message or submitted URL into a structured summary:
//! canonicalize the input, extract its content (web scrape/salvage or
//! YouTube transcript), chunk and summarize it through an LLM cascade with
//! self-correcting contract validation, and persist the result under a
//! stable correlation ID shared by every log, audit event, and artifact
//! row the submission produces.

pub mod agent;
pub mod canonicalizer;
pub mod chunker;
pub mod contract;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod lock;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod store;

pub use coordinator::{CoordinatorConfig, PipelineCoordinator, PollStatus};
pub use error::{Result, SummarizerError};
pub use models::{Request, RequestKind, RequestStatus, Summary, SummaryPayload};
