//! # Relay Core
//!
//! This crate provides the foundational types for the Relay data-pipeline
//! platform. It defines the durable data model that every other crate builds
//! upon.
//!
//! ## Key Components
//!
//! - **Events**: receipts of incoming data, owning one or more jobs
//! - **Jobs**: units of work against one destination action
//! - **Transitions**: append-only state-change records driving job status
//! - **Identifiers**: sortable unique ID generation
//! - **Errors**: common error types and validation reports

pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod transition;

// Re-export commonly used types
pub use error::{Error, Result, Validation};
pub use event::Event;
pub use id::{Id, generate_id, generate_id_with_prefix};
pub use job::Job;
pub use transition::{Status, Transition};

/// Common type aliases for convenience
pub type DateTime = chrono::DateTime<chrono::Utc>;
pub type Json = serde_json::Value;
