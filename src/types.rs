use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use crate::validation::{self, validate_credentials};
use crate::{DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS};

/// Validated client credentials. Immutable once constructed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    public_key: String,
    secret_key: String,
    api_url: Url,
}

impl Credentials {
    pub fn new(
        public_key: Option<&str>,
        secret_key: Option<&str>,
        api_url: Option<&str>,
    ) -> Result<Self> {
        validate_credentials(public_key, secret_key, api_url)?;
        // validate_credentials guarantees presence and a parseable URL.
        let api_url = api_url.unwrap_or_default().trim();
        let api_url =
            Url::parse(api_url).map_err(|_| Error::config("Malformed API URL"))?;
        Ok(Self {
            public_key: public_key.unwrap_or_default().trim().to_string(),
            secret_key: secret_key.unwrap_or_default().trim().to_string(),
            api_url,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// The bearer credential sent as the `Authorization` value.
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}

/// A single workflow execution request.
///
/// `args` keep insertion order. Entries in `files` name argument keys whose
/// values are replaced with the uploaded object reference before submission.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRequest {
    pub workflow_definition_id: String,
    pub args: Map<String, Value>,
    pub tags: BTreeMap<String, String>,
    pub files: BTreeMap<String, PathBuf>,
    /// Poll timeout in seconds.
    pub timeout: f64,
    /// Delay between polls in seconds.
    pub retry_delay: f64,
}

impl WorkflowRequest {
    pub fn new(workflow_definition_id: impl Into<String>) -> Self {
        Self {
            workflow_definition_id: workflow_definition_id.into(),
            args: Map::new(),
            tags: BTreeMap::new(),
            files: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn args(mut self, args: Map<String, Value>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn file(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.insert(key.into(), path.into());
        self
    }

    pub fn files<K, P>(mut self, files: impl IntoIterator<Item = (K, P)>) -> Self
    where
        K: Into<String>,
        P: Into<PathBuf>,
    {
        self.files
            .extend(files.into_iter().map(|(k, p)| (k.into(), p.into())));
        self
    }

    pub fn timeout(mut self, seconds: impl Into<f64>) -> Self {
        self.timeout = seconds.into();
        self
    }

    pub fn retry_delay(mut self, seconds: impl Into<f64>) -> Self {
        self.retry_delay = seconds.into();
        self
    }

    /// Builds a request from a dynamic JSON document:
    ///
    /// ```json
    /// {
    ///   "workflow_definition_id": "def-1",
    ///   "args": {"language": "en"},
    ///   "tags": {"userId": "u-1"},
    ///   "files": {"document": "./report.pdf"},
    ///   "timeout": 600,
    ///   "retry_delay": 1
    /// }
    /// ```
    ///
    /// Only `workflow_definition_id` is required.
    pub fn from_value(value: &Value) -> Result<Self> {
        let definition_id = value
            .get("workflow_definition_id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::validation("Workflow definition ID is required"))?;

        let args = match value.get("args") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(Error::validation("Workflow args must be a dictionary")),
        };

        let timeout = value
            .get("timeout")
            .cloned()
            .unwrap_or_else(|| Value::from(DEFAULT_TIMEOUT_SECS));
        let retry_delay = value
            .get("retry_delay")
            .cloned()
            .unwrap_or_else(|| Value::from(DEFAULT_RETRY_DELAY_SECS));
        let (timeout, retry_delay) = validation::validate_timing_value(&timeout, &retry_delay)?;

        let tags = value.get("tags");
        validation::validate_tags(tags)?;
        let files = value.get("files");
        validation::validate_files(files)?;

        Ok(Self::new(definition_id)
            .args(args)
            .tags(string_entries(tags))
            .files(string_entries(files))
            .timeout(timeout)
            .retry_delay(retry_delay))
    }
}

fn string_entries(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

/// Tabular read: rows of `table` matching every filter, projected onto `select`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub table: String,
    /// Comma-separated column list.
    pub select: String,
    pub filters: Vec<RowFilter>,
}

impl RowQuery {
    pub fn new(table: impl Into<String>, select: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: select.into(),
            filters: Vec::new(),
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(RowFilter {
            column: column.into(),
            value: value.into(),
        });
        self
    }
}

/// Storage response for a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Full stored path, bucket-qualified (`documents/<user>/<ts>-<name>`).
    #[serde(rename = "Key")]
    pub key: String,
}

/// Server-side state of a workflow instance.
///
/// `CANCELLED` and any other unrecognized status decode as `Other` and keep
/// the poll loop running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    #[serde(other)]
    Other,
}

/// One row of the workflow instance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstanceRow {
    pub status: WorkflowStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new(
            Some("aGVhZA.cGF5bG9hZA.c2ln"),
            Some("1c4f7c9e-7b1d-4a3e-9f2a-5d6b8c0e1f2a"),
            Some("https://api.example.com"),
        )
        .expect("credentials should validate");
        let debug = format!("{creds:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("1c4f7c9e"));
    }

    #[test]
    fn builder_defaults_and_order() {
        let req = WorkflowRequest::new("def-1")
            .arg("b", 1)
            .arg("a", "two")
            .timeout(30)
            .retry_delay(2.5);
        assert_eq!(req.timeout, 30.0);
        assert_eq!(req.retry_delay, 2.5);
        let keys: Vec<&str> = req.args.keys().map(String::as_str).collect();
        assert_eq!(keys, ["b", "a"]);

        let defaults = WorkflowRequest::new("def-1");
        assert_eq!(defaults.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(defaults.retry_delay, DEFAULT_RETRY_DELAY_SECS);
    }

    #[test]
    fn from_value_reads_all_fields() {
        let req = WorkflowRequest::from_value(&json!({
            "workflow_definition_id": "def-1",
            "args": {"arg": "value"},
            "tags": {"userId": "u-1"},
            "files": {"doc": "/tmp/doc.txt"},
            "timeout": 120,
            "retry_delay": 5
        }))
        .expect("request should parse");

        assert_eq!(req.workflow_definition_id, "def-1");
        assert_eq!(req.args.get("arg"), Some(&json!("value")));
        assert_eq!(req.tags.get("userId").map(String::as_str), Some("u-1"));
        assert_eq!(req.files.get("doc"), Some(&PathBuf::from("/tmp/doc.txt")));
        assert_eq!(req.timeout, 120.0);
        assert_eq!(req.retry_delay, 5.0);
    }

    #[test]
    fn from_value_rejects_bad_input() {
        let err = |v: Value| WorkflowRequest::from_value(&v).unwrap_err().to_string();
        assert_eq!(
            err(json!({"workflow_definition_id": "d", "timeout": "600"})),
            "Timeout must be between 1 and 3600 seconds"
        );
        assert_eq!(
            err(json!({"workflow_definition_id": "d", "tags": {"k": 1}})),
            "Tag keys and values must be strings"
        );
        assert_eq!(
            err(json!({"workflow_definition_id": "d", "files": "x"})),
            "Files must be a dictionary"
        );
        assert_eq!(err(json!({"args": {}})), "Workflow definition ID is required");
    }

    #[test]
    fn unknown_status_decodes_as_other() {
        let row: WorkflowInstanceRow =
            serde_json::from_value(json!({"status": "CANCELLED", "result": null})).unwrap();
        assert_eq!(row.status, WorkflowStatus::Other);
        assert_eq!(row.result, None);

        let row: WorkflowInstanceRow =
            serde_json::from_value(json!({"status": "COMPLETED"})).unwrap();
        assert_eq!(row.status, WorkflowStatus::Completed);
    }
}
