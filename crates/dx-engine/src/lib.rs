//! `dx-engine`: async driver for the data-virtualization engine's JSON
//! management API.
//!
//! Only the calls needed to operate on virtual databases are covered:
//!
//! ```text
//! DxClient::login      ← POST /session, POST /login (cookie-backed session)
//!     │
//!     ├── list_sources / find_source_by_name   ← GET  /source
//!     ├── source_operation                     ← POST /source/{ref}/{op}
//!     ├── job                                  ← GET  /job/{ref}
//!     └── capacity_consumers                   ← GET  /capacity/consumer
//! ```
//!
//! Every response is an `OKResult`, `ListResult`, or `ErrorResult` envelope;
//! `ErrorResult` bodies become [`DxError::Api`] with the engine's message.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DxClient, Endpoint, API_PREFIX};
pub use error::DxError;
pub use types::{CapacityBreakdown, ConsumerRecord, JobRecord, SourceOperation, SourceRecord};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DxError>;
