//! Clinivault ingestion pipeline
//!
//! Ties the processing stages, the quota accountant and the storage gateway into
//! one state machine per upload, and emits an audit event for every terminal
//! outcome.

pub mod audit;
pub mod pipeline;
pub mod quota;
pub mod telemetry;

pub use audit::TracingAuditSink;
pub use pipeline::{AttachmentPipeline, DeleteMode, PipelineRejection, PipelineState};
pub use quota::{InMemoryQuotaStore, QuotaAccountant};
pub use telemetry::init_telemetry;
