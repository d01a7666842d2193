//! CloudFormation custom resource that empties the artifacts bucket before the
//! stack deletes it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::adapters::cfn_response::ResponseSender;
use crate::adapters::object_store::BucketContents;

pub const BUCKET_NAME_PROPERTY: &str = "BucketName";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CleanBucketError {
    #[error("BucketName must be defined in the resource properties")]
    MissingBucketName,
    #[error("failed to clean bucket: {0}")]
    Storage(String),
    #[error("failed to deliver custom resource response: {0}")]
    Response(String),
    #[error("invalid custom resource event: {0}")]
    InvalidEvent(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
}

impl CustomResourceEvent {
    pub fn bucket_name(&self) -> Result<&str, CleanBucketError> {
        self.resource_properties
            .get(BUCKET_NAME_PROPERTY)
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .ok_or(CleanBucketError::MissingBucketName)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    pub bucket: String,
    pub objects_deleted: usize,
}

pub fn handle_custom_resource_event(
    event: &CustomResourceEvent,
    contents: &impl BucketContents,
) -> Result<CleanOutcome, CleanBucketError> {
    let bucket = event.bucket_name()?.to_string();

    let objects_deleted = match event.request_type {
        RequestType::Create | RequestType::Update => {
            info!(bucket = %bucket, request_type = ?event.request_type, "bucket_cleaner_registered");
            0
        }
        RequestType::Delete => {
            let keys = contents
                .list_keys(&bucket)
                .map_err(CleanBucketError::Storage)?;
            let deleted = if keys.is_empty() {
                0
            } else {
                contents
                    .delete_keys(&bucket, &keys)
                    .map_err(CleanBucketError::Storage)?
            };
            info!(bucket = %bucket, objects_deleted = deleted, "bucket_cleaned");
            deleted
        }
    };

    Ok(CleanOutcome {
        bucket,
        objects_deleted,
    })
}

pub fn build_response(
    event: &CustomResourceEvent,
    result: &Result<CleanOutcome, CleanBucketError>,
) -> CustomResourceResponse {
    let physical_resource_id = event
        .physical_resource_id
        .clone()
        .or_else(|| result.as_ref().ok().map(|outcome| outcome.bucket.clone()))
        .unwrap_or_else(|| event.logical_resource_id.clone());

    let (status, reason, data) = match result {
        Ok(outcome) => {
            let mut data = Map::new();
            data.insert("BucketName".to_string(), Value::from(outcome.bucket.clone()));
            data.insert(
                "ObjectsDeleted".to_string(),
                Value::from(outcome.objects_deleted),
            );
            (ResponseStatus::Success, String::new(), data)
        }
        Err(clean_error) => (ResponseStatus::Failed, clean_error.to_string(), Map::new()),
    };

    CustomResourceResponse {
        status,
        reason,
        physical_resource_id,
        stack_id: event.stack_id.clone(),
        request_id: event.request_id.clone(),
        logical_resource_id: event.logical_resource_id.clone(),
        data,
    }
}

/// Run the request and always report the result back to CloudFormation, so a
/// failing clean never leaves the stack waiting for a response.
pub fn respond_to_custom_resource_event(
    event: &CustomResourceEvent,
    contents: &impl BucketContents,
    sender: &impl ResponseSender,
) -> Result<CustomResourceResponse, CleanBucketError> {
    let result = handle_custom_resource_event(event, contents);
    if let Err(clean_error) = &result {
        error!(
            logical_resource_id = %event.logical_resource_id,
            error = %clean_error,
            "bucket_cleaner_failed"
        );
    }

    let response = build_response(event, &result);
    sender
        .send(&event.response_url, &response)
        .map_err(CleanBucketError::Response)?;
    Ok(response)
}

/// Entry point for raw Lambda payloads. An event that cannot be parsed is
/// still answered with FAILED when it carries a `ResponseURL`.
pub fn respond_to_raw_event(
    payload: Value,
    contents: &impl BucketContents,
    sender: &impl ResponseSender,
) -> Result<CustomResourceResponse, CleanBucketError> {
    let parse_error = match serde_json::from_value::<CustomResourceEvent>(payload.clone()) {
        Ok(event) => return respond_to_custom_resource_event(&event, contents, sender),
        Err(parse_error) => CleanBucketError::InvalidEvent(parse_error.to_string()),
    };
    error!(error = %parse_error, "bucket_cleaner_rejected_event");

    let Some(response_url) = raw_field(&payload, "ResponseURL") else {
        return Err(parse_error);
    };
    let logical_resource_id = raw_field(&payload, "LogicalResourceId").unwrap_or_default();
    let response = CustomResourceResponse {
        status: ResponseStatus::Failed,
        reason: parse_error.to_string(),
        physical_resource_id: raw_field(&payload, "PhysicalResourceId")
            .unwrap_or_else(|| logical_resource_id.clone()),
        stack_id: raw_field(&payload, "StackId").unwrap_or_default(),
        request_id: raw_field(&payload, "RequestId").unwrap_or_default(),
        logical_resource_id,
        data: Map::new(),
    };
    sender
        .send(&response_url, &response)
        .map_err(CleanBucketError::Response)?;
    Err(parse_error)
}

fn raw_field(payload: &Value, name: &str) -> Option<String> {
    payload.get(name).and_then(Value::as_str).map(str::to_string)
}
