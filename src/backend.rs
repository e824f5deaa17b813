//! Data-access collaborator seams.
//!
//! The clients only ever invoke a named procedure, fetch rows matching a
//! filter, or upload an object. [`crate::HttpBackend`] speaks the REST wire
//! format; [`crate::mock::MockBackend`] serves queued responses in memory.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::errors::Fault;
use crate::types::{RowQuery, UploadReceipt};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Async data-access capabilities.
pub trait Backend: Send + Sync {
    /// Invokes the remote procedure `name` with a JSON payload.
    fn call_procedure<'a>(
        &'a self,
        name: &'a str,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Fault>>;

    /// Fetches rows matching `query`.
    fn select_rows<'a>(&'a self, query: &'a RowQuery) -> BoxFuture<'a, Result<Vec<Value>, Fault>>;

    /// Stores `body` under `key` in `bucket`.
    fn upload_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadReceipt, Fault>>;
}

/// Blocking counterpart of [`Backend`].
pub trait BlockingBackend: Send + Sync {
    fn call_procedure(&self, name: &str, payload: &Value) -> Result<Value, Fault>;

    fn select_rows(&self, query: &RowQuery) -> Result<Vec<Value>, Fault>;

    fn upload_object(&self, bucket: &str, key: &str, body: Vec<u8>)
        -> Result<UploadReceipt, Fault>;
}
