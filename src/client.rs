use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use futures_util::future::try_join_all;
use reqwest::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::time::{sleep, Instant};

use crate::{
    backend::{Backend, BoxFuture},
    core::{self, PollStep},
    errors::{Error, Fault, Result},
    http::{self, API_KEY_HEADER, CLIENT_INFO_HEADER, OCTET_STREAM},
    types::{Credentials, RowQuery, UploadReceipt, WorkflowRequest},
    DEFAULT_API_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DOCUMENTS_BUCKET, START_WORKFLOW_PROCEDURE,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// JWT-shaped public key, sent as the `apikey` header.
    pub public_key: Option<String>,
    /// UUID v4 secret key, sent as the `Authorization` value.
    pub secret_key: Option<String>,
    pub api_url: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the per-request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
}

/// Async workflow client.
///
/// Cloning is cheap; clones share the backend and the cached user ID.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    credentials: Credentials,
    backend: Arc<dyn Backend>,
    user_id: OnceCell<String>,
}

/// Creates an async client talking to `api_url` over HTTP.
pub fn create_client(
    public_key: impl Into<String>,
    secret_key: impl Into<String>,
    api_url: impl Into<String>,
) -> Result<Client> {
    Client::new(Config {
        public_key: Some(public_key.into()),
        secret_key: Some(secret_key.into()),
        api_url: Some(api_url.into()),
        ..Default::default()
    })
}

/// Creates an async client for the hosted API at [`DEFAULT_API_URL`].
pub fn create_default_client(
    public_key: impl Into<String>,
    secret_key: impl Into<String>,
) -> Result<Client> {
    create_client(public_key, secret_key, DEFAULT_API_URL)
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let credentials = Credentials::new(
            cfg.public_key.as_deref(),
            cfg.secret_key.as_deref(),
            cfg.api_url.as_deref(),
        )?;
        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .build()
                .map_err(|_| Error::config("Unable to create API client"))?,
        };
        let backend = HttpBackend::new(
            credentials.clone(),
            http,
            cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        );
        Ok(Self::from_parts(credentials, Arc::new(backend)))
    }

    /// Creates a client over a caller-supplied backend. Credentials are still
    /// validated; the secret key drives the user ID lookup.
    pub fn with_backend(
        public_key: &str,
        secret_key: &str,
        api_url: &str,
        backend: Arc<dyn Backend>,
    ) -> Result<Self> {
        let credentials = Credentials::new(Some(public_key), Some(secret_key), Some(api_url))?;
        Ok(Self::from_parts(credentials, backend))
    }

    fn from_parts(credentials: Credentials, backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                credentials,
                backend,
                user_id: OnceCell::new(),
            }),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Submits a workflow, stages its files, then polls until the instance
    /// completes. Returns the instance `result` (an empty object if absent).
    ///
    /// Only a still-running instance is retried. The timeout is measured from
    /// the start of polling; dropping the returned future cancels the poll.
    pub async fn run_workflow(&self, req: WorkflowRequest) -> Result<Value> {
        core::validate_request(&req)?;

        let staged = self.stage_files(&req).await?;
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
            .await
            .map_err(translate)?;
        let instance_id = core::instance_id_from(&response)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(instance_id = %instance_id, "workflow instance started");

        self.poll_instance(&instance_id, req.timeout, req.retry_delay)
            .await
    }

    async fn poll_instance(&self, instance_id: &str, timeout: f64, delay: f64) -> Result<Value> {
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
                .await
                .map_err(translate)?;
            match core::poll_step(rows, instance_id)? {
                PollStep::Done(result) => return Ok(result),
                PollStep::Pending(_status) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(instance_id, status = ?_status, "workflow still running");
                    sleep(delay).await;
                }
            }
        }
    }

    async fn stage_files(&self, req: &WorkflowRequest) -> Result<Vec<(String, String)>> {
        try_join_all(req.files.iter().map(|(key, path)| async move {
            let reference = self.upload_file(path).await?;
            Ok::<_, Error>((key.clone(), reference))
        }))
        .await
    }

    /// Uploads a local file to the documents bucket and returns its object
    /// reference without the bucket prefix (`<user_id>/<timestamp>-<name>`).
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(core::file_not_found(path));
        }
        let body = tokio::fs::read(path).await.map_err(Error::upload_failed)?;
        let user_id = self.lookup_user_id().await?;
        let key = core::object_key(&user_id, core::upload_timestamp(), path)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), key = %key, bytes = body.len(), "uploading file");
        let receipt = self
            .inner
            .backend
            .upload_object(DOCUMENTS_BUCKET, &key, body)
            .await
            .map_err(|fault| {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %fault, "file upload failed");
                Error::upload_failed(fault)
            })?;
        Ok(core::strip_bucket_prefix(&receipt.key))
    }

    /// Resolves the user ID owning the secret key. The first successful
    /// lookup is cached for the lifetime of the client (and its clones).
    pub async fn lookup_user_id(&self) -> Result<String> {
        self.inner
            .user_id
            .get_or_try_init(|| async {
                let query = core::user_query(self.inner.credentials.secret_key());
                let rows = self
                    .inner
                    .backend
                    .select_rows(&query)
                    .await
                    .map_err(|fault| Error::lookup_failed(&fault))?;
                core::user_id_from_rows(&rows)
            })
            .await
            .cloned()
    }
}

fn translate(fault: Fault) -> Error {
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %fault, "backend call failed");
    Error::from(fault)
}

/// Backend speaking the REST wire format over an async reqwest client.
#[derive(Clone)]
pub struct HttpBackend {
    credentials: Credentials,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(credentials: Credentials, http: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            credentials,
            http,
            request_timeout,
        }
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .timeout(self.request_timeout)
            .header(ACCEPT, "application/json")
            .header(CLIENT_INFO_HEADER, DEFAULT_CLIENT_HEADER)
            .header(API_KEY_HEADER, self.credentials.public_key())
            .header(AUTHORIZATION, self.credentials.secret_key())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Fault> {
        let resp = builder.send().await.map_err(http::transport_fault)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(http::transport_fault)?;
        if !status.is_success() {
            return Err(http::parse_fault(status, &String::from_utf8_lossy(&bytes)));
        }
        serde_json::from_slice(&bytes).map_err(http::decode_fault)
    }
}

impl Backend for HttpBackend {
    fn call_procedure<'a>(
        &'a self,
        name: &'a str,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Fault>> {
        Box::pin(async move {
            let url = http::rpc_url(self.credentials.api_url(), name);
            self.execute_json(self.request(Method::POST, url).json(payload))
                .await
        })
    }

    fn select_rows<'a>(&'a self, query: &'a RowQuery) -> BoxFuture<'a, Result<Vec<Value>, Fault>> {
        Box::pin(async move {
            let url = http::rest_url(self.credentials.api_url(), &query.table);
            let builder = self
                .request(Method::GET, url)
                .query(&http::query_pairs(query));
            self.execute_json(builder).await
        })
    }

    fn upload_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadReceipt, Fault>> {
        Box::pin(async move {
            let url = http::storage_url(self.credentials.api_url(), bucket, key);
            let builder = self
                .request(Method::POST, url)
                .header(CONTENT_TYPE, OCTET_STREAM)
                .body(body);
            self.execute_json(builder).await
        })
    }
}
