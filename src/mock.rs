//! In-memory backend for offline tests. Requires the `mock` feature.
//!
//! Responses are queued per capability (and per table for row fetches). When
//! a queue holds a single response it is repeated, so a lone `RUNNING` row
//! keeps a poll loop busy until it times out.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{
    backend::{Backend, BlockingBackend, BoxFuture},
    errors::{ApiFault, Fault},
    types::{RowQuery, UploadReceipt},
};

/// A call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Procedure { name: String, payload: Value },
    Select(RowQuery),
    Upload { bucket: String, key: String, body: Vec<u8> },
}

#[derive(Default)]
pub struct MockConfig {
    pub procedure_responses: Vec<Result<Value, Fault>>,
    pub rows: HashMap<String, Vec<Result<Vec<Value>, Fault>>>,
    pub upload_responses: Vec<Result<UploadReceipt, Fault>>,
}

impl MockConfig {
    pub fn with_procedure_response(mut self, resp: Value) -> Self {
        self.procedure_responses.push(Ok(resp));
        self
    }

    pub fn with_procedure_fault(mut self, fault: Fault) -> Self {
        self.procedure_responses.push(Err(fault));
        self
    }

    pub fn with_rows(mut self, table: &str, rows: Vec<Value>) -> Self {
        self.rows.entry(table.to_string()).or_default().push(Ok(rows));
        self
    }

    pub fn with_rows_fault(mut self, table: &str, fault: Fault) -> Self {
        self.rows
            .entry(table.to_string())
            .or_default()
            .push(Err(fault));
        self
    }

    pub fn with_upload_key(mut self, key: impl Into<String>) -> Self {
        self.upload_responses
            .push(Ok(UploadReceipt { key: key.into() }));
        self
    }

    pub fn with_upload_fault(mut self, fault: Fault) -> Self {
        self.upload_responses.push(Err(fault));
        self
    }
}

#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<MockInner>,
}

struct MockInner {
    procedure_responses: Mutex<VecDeque<Result<Value, Fault>>>,
    rows: Mutex<HashMap<String, VecDeque<Result<Vec<Value>, Fault>>>>,
    upload_responses: Mutex<VecDeque<Result<UploadReceipt, Fault>>>,
    calls: Mutex<Vec<MockCall>>,
}

fn next_response<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn unconfigured(what: &str) -> Fault {
    Fault::Api(ApiFault::new(500, format!("no mock {what} queued")))
}

impl MockBackend {
    pub fn new(cfg: MockConfig) -> Self {
        Self {
            inner: Arc::new(MockInner {
                procedure_responses: Mutex::new(VecDeque::from(cfg.procedure_responses)),
                rows: Mutex::new(
                    cfg.rows
                        .into_iter()
                        .map(|(table, responses)| (table, VecDeque::from(responses)))
                        .collect(),
                ),
                upload_responses: Mutex::new(VecDeque::from(cfg.upload_responses)),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.calls.lock().expect("lock poisoned").clone()
    }

    /// Row fetches made against `table`.
    pub fn selects_on(&self, table: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Select(q) if q.table == table))
            .count()
    }

    /// Payloads passed to procedure `name`.
    pub fn procedure_payloads(&self, name: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Procedure { name: n, payload } if n == name => Some(payload),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.inner.calls.lock().expect("lock poisoned").push(call);
    }

    fn procedure(&self, name: &str, payload: &Value) -> Result<Value, Fault> {
        self.record(MockCall::Procedure {
            name: name.to_string(),
            payload: payload.clone(),
        });
        let mut queue = self.inner.procedure_responses.lock().expect("lock poisoned");
        next_response(&mut queue).unwrap_or_else(|| Err(unconfigured("procedure response")))
    }

    fn select(&self, query: &RowQuery) -> Result<Vec<Value>, Fault> {
        self.record(MockCall::Select(query.clone()));
        let mut tables = self.inner.rows.lock().expect("lock poisoned");
        tables
            .get_mut(&query.table)
            .and_then(next_response)
            .unwrap_or_else(|| Err(unconfigured(&format!("rows for {}", query.table))))
    }

    fn upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<UploadReceipt, Fault> {
        self.record(MockCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
        });
        let mut queue = self.inner.upload_responses.lock().expect("lock poisoned");
        next_response(&mut queue).unwrap_or_else(|| Err(unconfigured("upload response")))
    }
}

impl Backend for MockBackend {
    fn call_procedure<'a>(
        &'a self,
        name: &'a str,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Fault>> {
        Box::pin(async move { self.procedure(name, payload) })
    }

    fn select_rows<'a>(&'a self, query: &'a RowQuery) -> BoxFuture<'a, Result<Vec<Value>, Fault>> {
        Box::pin(async move { self.select(query) })
    }

    fn upload_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadReceipt, Fault>> {
        Box::pin(async move { self.upload(bucket, key, body) })
    }
}

impl BlockingBackend for MockBackend {
    fn call_procedure(&self, name: &str, payload: &Value) -> Result<Value, Fault> {
        self.procedure(name, payload)
    }

    fn select_rows(&self, query: &RowQuery) -> Result<Vec<Value>, Fault> {
        self.select(query)
    }

    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<UploadReceipt, Fault> {
        self.upload(bucket, key, body)
    }
}
