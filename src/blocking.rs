use std::{
    path::Path,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use reqwest::{
    blocking::{Client as HttpClient, RequestBuilder},
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    backend::BlockingBackend,
    core::{self, PollStep},
    errors::{Error, Fault, Result},
    http::{self, API_KEY_HEADER, CLIENT_INFO_HEADER, OCTET_STREAM},
    types::{Credentials, RowQuery, UploadReceipt, WorkflowRequest},
    DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DOCUMENTS_BUCKET,
    START_WORKFLOW_PROCEDURE,
};

#[derive(Clone, Debug, Default)]
pub struct BlockingConfig {
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    pub api_url: Option<String>,
    pub http_client: Option<HttpClient>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the per-request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
}

/// Blocking workflow client; the poll loop sleeps the calling thread.
#[derive(Clone)]
pub struct BlockingClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    credentials: Credentials,
    backend: Arc<dyn BlockingBackend>,
    user_id: Mutex<Option<String>>,
}

/// Creates a blocking client talking to `api_url` over HTTP.
pub fn create_blocking_client(
    public_key: impl Into<String>,
    secret_key: impl Into<String>,
    api_url: impl Into<String>,
) -> Result<BlockingClient> {
    BlockingClient::new(BlockingConfig {
        public_key: Some(public_key.into()),
        secret_key: Some(secret_key.into()),
        api_url: Some(api_url.into()),
        ..Default::default()
    })
}

impl BlockingClient {
    pub fn new(cfg: BlockingConfig) -> Result<Self> {
        let credentials = Credentials::new(
            cfg.public_key.as_deref(),
            cfg.secret_key.as_deref(),
            cfg.api_url.as_deref(),
        )?;
        let http = match cfg.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .connect_timeout(cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .build()
                .map_err(|_| Error::config("Unable to create API client"))?,
        };
        let backend = BlockingHttpBackend::new(
            credentials.clone(),
            http,
            cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        );
        Ok(Self::from_parts(credentials, Arc::new(backend)))
    }

    pub fn with_backend(
        public_key: &str,
        secret_key: &str,
        api_url: &str,
        backend: Arc<dyn BlockingBackend>,
    ) -> Result<Self> {
        let credentials = Credentials::new(Some(public_key), Some(secret_key), Some(api_url))?;
        Ok(Self::from_parts(credentials, backend))
    }

    fn from_parts(credentials: Credentials, backend: Arc<dyn BlockingBackend>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                credentials,
                backend,
                user_id: Mutex::new(None),
            }),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Blocking variant of [`crate::Client::run_workflow`]. Files are staged
    /// one at a time.
    pub fn run_workflow(&self, req: WorkflowRequest) -> Result<Value> {
        core::validate_request(&req)?;

        let mut staged = Vec::with_capacity(req.files.len());
        for (key, path) in &req.files {
            staged.push((key.clone(), self.upload_file(path)?));
        }
        let args = core::apply_staged_files(&req.args, staged);

        let payload = core::start_payload(&req, &args);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            workflow_definition_id = %req.workflow_definition_id,
            tags = req.tags.len(),
            "submitting workflow"
        );
        let response = self
            .inner
            .backend
            .call_procedure(START_WORKFLOW_PROCEDURE, &payload)
            .map_err(translate)?;
        let instance_id = core::instance_id_from(&response)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(instance_id = %instance_id, "workflow instance started");

        self.poll_instance(&instance_id, req.timeout, req.retry_delay)
    }

    fn poll_instance(&self, instance_id: &str, timeout: f64, delay: f64) -> Result<Value> {
        let query = core::instance_query(instance_id);
        let delay = core::retry_delay(delay);
        let started = Instant::now();

        loop {
            if core::deadline_exceeded(started.elapsed(), timeout) {
                #[cfg(feature = "tracing")]
                tracing::warn!(instance_id, timeout, "workflow poll timed out");
                return Err(Error::timed_out(timeout));
            }
            let rows = self
                .inner
                .backend
                .select_rows(&query)
                .map_err(translate)?;
            match core::poll_step(rows, instance_id)? {
                PollStep::Done(result) => return Ok(result),
                PollStep::Pending(_status) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(instance_id, status = ?_status, "workflow still running");
                    thread::sleep(delay);
                }
            }
        }
    }

    pub fn upload_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(core::file_not_found(path));
        }
        let body = std::fs::read(path).map_err(Error::upload_failed)?;
        let user_id = self.lookup_user_id()?;
        let key = core::object_key(&user_id, core::upload_timestamp(), path)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), key = %key, bytes = body.len(), "uploading file");
        let receipt = self
            .inner
            .backend
            .upload_object(DOCUMENTS_BUCKET, &key, body)
            .map_err(|fault| {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %fault, "file upload failed");
                Error::upload_failed(fault)
            })?;
        Ok(core::strip_bucket_prefix(&receipt.key))
    }

    /// Resolves and caches the user ID owning the secret key.
    ///
    /// The cache lock is released during the lookup, so concurrent first
    /// callers may each query once; they all store the same value.
    pub fn lookup_user_id(&self) -> Result<String> {
        if let Some(user_id) = self.cached_user_id() {
            return Ok(user_id);
        }
        let query = core::user_query(self.inner.credentials.secret_key());
        let rows = self
            .inner
            .backend
            .select_rows(&query)
            .map_err(|fault| Error::lookup_failed(&fault))?;
        let user_id = core::user_id_from_rows(&rows)?;

        let mut slot = self
            .inner
            .user_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(slot.get_or_insert(user_id).clone())
    }

    fn cached_user_id(&self) -> Option<String> {
        self.inner
            .user_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn translate(fault: Fault) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %fault, "backend call failed");
    Error::from(fault)
}

/// Backend speaking the REST wire format over a blocking reqwest client.
#[derive(Clone)]
pub struct BlockingHttpBackend {
    credentials: Credentials,
    http: HttpClient,
    request_timeout: Duration,
}

impl BlockingHttpBackend {
    pub fn new(credentials: Credentials, http: HttpClient, request_timeout: Duration) -> Self {
        Self {
            credentials,
            http,
            request_timeout,
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .timeout(self.request_timeout)
            .header(ACCEPT, "application/json")
            .header(CLIENT_INFO_HEADER, DEFAULT_CLIENT_HEADER)
            .header(API_KEY_HEADER, self.credentials.public_key())
            .header(AUTHORIZATION, self.credentials.secret_key())
    }

    fn execute_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, Fault> {
        let resp = builder.send().map_err(http::transport_fault)?;
        let status = resp.status();
        let bytes = resp.bytes().map_err(http::transport_fault)?;
        if !status.is_success() {
            return Err(http::parse_fault(status, &String::from_utf8_lossy(&bytes)));
        }
        serde_json::from_slice(&bytes).map_err(http::decode_fault)
    }
}

impl BlockingBackend for BlockingHttpBackend {
    fn call_procedure(&self, name: &str, payload: &Value) -> Result<Value, Fault> {
        let url = http::rpc_url(self.credentials.api_url(), name);
        self.execute_json(self.request(Method::POST, url).json(payload))
    }

    fn select_rows(&self, query: &RowQuery) -> Result<Vec<Value>, Fault> {
        let url = http::rest_url(self.credentials.api_url(), &query.table);
        self.execute_json(
            self.request(Method::GET, url)
                .query(&http::query_pairs(query)),
        )
    }

    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<UploadReceipt, Fault> {
        let url = http::storage_url(self.credentials.api_url(), bucket, key);
        self.execute_json(
            self.request(Method::POST, url)
                .header(CONTENT_TYPE, OCTET_STREAM)
                .body(body),
        )
    }
}
