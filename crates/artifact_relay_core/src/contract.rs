use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EMPTY_ARTIFACT_KEY_REASON: &str = "empty artifact key";

/// One queued relay request: where to download the artifact and where to store it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    #[serde(rename = "ArtifactKey")]
    pub artifact_key: String,
    #[serde(rename = "ArtifactUrl")]
    pub artifact_url: String,
}

impl ArtifactDescriptor {
    pub fn new(artifact_key: impl Into<String>, artifact_url: impl Into<String>) -> Self {
        Self {
            artifact_key: artifact_key.into(),
            artifact_url: artifact_url.into(),
        }
    }

    /// Parse the JSON message body delivered by the queue.
    pub fn from_message_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Downloaded artifact bytes bound to the key they will be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPayload {
    pub destination_key: String,
    pub bytes: Vec<u8>,
}

impl ArtifactPayload {
    pub fn new(destination_key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            destination_key: destination_key.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("artifact source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("artifact source unreachable: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to write artifact to bucket: {cause}")]
pub struct UploadError {
    pub cause: String,
}

impl UploadError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Everything that can go wrong while relaying a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("template rewrite requires DISTRIBUTOR_BUCKET to be configured")]
    MissingDistributorBucket,
    #[error("invalid artifact message: {0}")]
    InvalidMessage(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Uploaded,
    Skipped(String),
    Failed(RelayError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Uploaded,
    Skipped,
    Failed,
}

impl ProcessingOutcome {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Uploaded => OutcomeStatus::Uploaded,
            Self::Skipped(_) => OutcomeStatus::Skipped,
            Self::Failed(_) => OutcomeStatus::Failed,
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Uploaded => None,
            Self::Skipped(reason) => Some(reason.clone()),
            Self::Failed(error) => Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub artifact_key: String,
    pub outcome: ProcessingOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRecord {
    pub artifact_key: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Invocation response summarising every record of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<ItemRecord>,
}

impl BatchReport {
    pub fn summarize(outcomes: &[ItemOutcome]) -> Self {
        let mut report = Self {
            items: Vec::with_capacity(outcomes.len()),
            ..Self::default()
        };

        for item in outcomes {
            let status = item.outcome.status();
            match status {
                OutcomeStatus::Uploaded => report.uploaded += 1,
                OutcomeStatus::Skipped => report.skipped += 1,
                OutcomeStatus::Failed => report.failed += 1,
            }
            report.items.push(ItemRecord {
                artifact_key: item.artifact_key.clone(),
                status,
                detail: item.outcome.detail(),
            });
        }

        report
    }
}
