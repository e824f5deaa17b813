//! Shared runtime-agnostic logic for async and blocking clients.
//!
//! ## Contents
//!
//! - **Request checks**: [`validate_request`] runs before any network call
//! - **Submission**: [`start_payload`], [`instance_id_from`]
//! - **Polling**: [`instance_query`], [`deadline_exceeded`], [`poll_step`]
//! - **Identity**: [`user_query`], [`user_id_from_rows`]
//! - **Staging**: [`object_key`], [`strip_bucket_prefix`], [`apply_staged_files`]

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::errors::{Error, Result};
use crate::types::{RowQuery, WorkflowInstanceRow, WorkflowRequest, WorkflowStatus};
use crate::validation::{validate_tag_lengths, validate_timing};
use crate::{DOCUMENTS_BUCKET, USERS_TABLE, WORKFLOW_INSTANCES_TABLE};

/// Checks timing and tags of a typed request.
pub(crate) fn validate_request(req: &WorkflowRequest) -> Result<()> {
    validate_timing(req.timeout, req.retry_delay)?;
    validate_tag_lengths(req.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    Ok(())
}

/// Builds the `start_workflow` payload. `tags` is omitted entirely when empty.
pub(crate) fn start_payload(req: &WorkflowRequest, args: &Map<String, Value>) -> Value {
    let mut payload = json!({
        "workflow_definition_id": req.workflow_definition_id,
        "request_body": args,
    });
    if !req.tags.is_empty() {
        payload["tags"] = json!(req.tags);
    }
    payload
}

/// Extracts `workflow_instance_id` from the submission response.
pub(crate) fn instance_id_from(response: &Value) -> Result<String> {
    match response.get("workflow_instance_id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(Error::Transport(
            "Request error occurred: response is missing workflow_instance_id".to_string(),
        )),
    }
}

pub(crate) fn instance_query(instance_id: &str) -> RowQuery {
    RowQuery::new(WORKFLOW_INSTANCES_TABLE, "status,result").eq("id", instance_id)
}

pub(crate) fn user_query(secret_key: &str) -> RowQuery {
    RowQuery::new(USERS_TABLE, "user_id").eq("api_key", secret_key)
}

/// Whether the poll loop has run past its timeout.
pub(crate) fn deadline_exceeded(elapsed: Duration, timeout_secs: f64) -> bool {
    elapsed.as_secs_f64() > timeout_secs
}

pub(crate) fn retry_delay(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds)
}

/// What the poll loop does after one fetch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PollStep {
    Done(Value),
    Pending(WorkflowStatus),
}

/// Decides the next poll step from the rows fetched for `instance_id`.
pub(crate) fn poll_step(rows: Vec<Value>, instance_id: &str) -> Result<PollStep> {
    let Some(row) = rows.into_iter().next() else {
        return Err(Error::NotFound(format!(
            "Workflow instance {instance_id} not found"
        )));
    };
    let row: WorkflowInstanceRow = serde_json::from_value(row)
        .map_err(|err| Error::Transport(format!("Request error occurred: {err}")))?;

    match row.status {
        WorkflowStatus::Completed => Ok(PollStep::Done(match row.result {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(result) => result,
        })),
        WorkflowStatus::Failed => {
            let detail = row.result.unwrap_or(Value::Null);
            Err(Error::WorkflowFailed(format!(
                "Workflow execution failed: {detail}"
            )))
        }
        status => Ok(PollStep::Pending(status)),
    }
}

/// Resolves the user ID from identity lookup rows.
pub(crate) fn user_id_from_rows(rows: &[Value]) -> Result<String> {
    rows.first()
        .and_then(|row| row.get("user_id"))
        .and_then(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| Error::Lookup("User ID not found, is your API key correct?".to_string()))
}

/// Object key for an upload: `<user_id>/<unix seconds>-<file name>`.
pub(crate) fn object_key(user_id: &str, timestamp: i64, path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::upload_failed(format!("{} has no file name", path.display())))?;
    Ok(format!("{user_id}/{timestamp}-{file_name}"))
}

pub(crate) fn upload_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Strips the `documents/` bucket prefix from a stored object key.
pub(crate) fn strip_bucket_prefix(key: &str) -> String {
    key.strip_prefix(DOCUMENTS_BUCKET)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
        .to_string()
}

/// Returns `args` with every staged file key overwritten by its remote reference.
pub(crate) fn apply_staged_files(
    args: &Map<String, Value>,
    staged: Vec<(String, String)>,
) -> Map<String, Value> {
    let mut args = args.clone();
    for (key, reference) in staged {
        args.insert(key, Value::String(reference));
    }
    args
}

pub(crate) fn file_not_found(path: &Path) -> Error {
    Error::NotFound(format!("File not found: {}", path.display()))
}
