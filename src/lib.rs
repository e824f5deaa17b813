//! Rust SDK for running TWS workflows.
//!
//! A client submits a named workflow definition with its arguments, stages
//! any local files the workflow needs, then polls the workflow instance until
//! it completes, fails or the poll timeout elapses.
//!
//! ```ignore
//! use tws::{create_client, WorkflowRequest};
//!
//! let client = create_client(public_key, secret_key, "https://api.example.com")?;
//! let result = client
//!     .run_workflow(
//!         WorkflowRequest::new("summarize-document")
//!             .arg("language", "en")
//!             .file("document", "./report.pdf")
//!             .tag("userId", "user-42"),
//!     )
//!     .await?;
//! ```

/// Default poll timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 600.0;

/// Default delay between polls in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

pub const MIN_TIMEOUT_SECS: f64 = 1.0;
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;
pub const MIN_RETRY_DELAY_SECS: f64 = 1.0;
pub const MAX_RETRY_DELAY_SECS: f64 = 60.0;

/// Maximum length, in characters, of a tag key or value.
pub const MAX_TAG_LENGTH: usize = 255;

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default per-request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Hosted API endpoint used by [`create_default_client`].
pub const DEFAULT_API_URL: &str = "https://api.tuneni.ai";

/// Remote procedure that creates a workflow instance.
pub const START_WORKFLOW_PROCEDURE: &str = "start_workflow";

/// Table holding workflow instance status and result.
pub const WORKFLOW_INSTANCES_TABLE: &str = "workflow_instances";

/// Table mapping API keys to user IDs.
pub const USERS_TABLE: &str = "users_private";

/// Storage bucket that staged files are uploaded into.
pub const DOCUMENTS_BUCKET: &str = "documents";

/// Value sent in the `X-Client-Info` header.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("tws-rust/", env!("CARGO_PKG_VERSION"));

mod backend;
#[cfg(feature = "blocking")]
mod blocking;
mod client;
mod core;
mod errors;
mod http;
#[cfg(feature = "mock")]
pub mod mock;
mod types;
pub mod validation;

pub use backend::{Backend, BlockingBackend, BoxFuture};
#[cfg(feature = "blocking")]
pub use blocking::{create_blocking_client, BlockingClient, BlockingConfig, BlockingHttpBackend};
pub use client::{create_client, create_default_client, Client, Config, HttpBackend};
pub use errors::{ApiFault, Error, Fault, Result, DEFINITION_NOT_FOUND_CODE};
pub use types::{
    Credentials, RowFilter, RowQuery, UploadReceipt, WorkflowInstanceRow, WorkflowRequest,
    WorkflowStatus,
};
