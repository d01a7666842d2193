use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::fetch::ArtifactFetcher;
use crate::adapters::object_store::ArtifactStore;
use crate::runtime::classifier::is_template;
use crate::runtime::config::RelayConfig;
use crate::runtime::contract::{
    ArtifactDescriptor, ArtifactPayload, BatchReport, ItemOutcome, ProcessingOutcome, RelayError,
    EMPTY_ARTIFACT_KEY_REASON,
};
use crate::runtime::rewrite::{ReferenceRewriter, RewriteError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("SQS event must include Records array")]
    MissingRecords,
}

/// How templates are treated before upload.
#[derive(Debug, Clone)]
enum TemplatePolicy {
    Rewrite(ReferenceRewriter),
    PassThrough,
    Unconfigured,
}

/// Drives fetch, classify, rewrite and upload for every descriptor of a batch.
///
/// Failures are captured per item; one broken artifact never stops the rest
/// of the batch from being relayed.
pub struct BatchProcessor<'a, F: ArtifactFetcher, S: ArtifactStore> {
    fetcher: &'a F,
    store: &'a S,
    templates: TemplatePolicy,
}

impl<'a, F: ArtifactFetcher, S: ArtifactStore> BatchProcessor<'a, F, S> {
    pub fn new(config: &RelayConfig, fetcher: &'a F, store: &'a S) -> Result<Self, RewriteError> {
        let templates = match config.bucket_identity() {
            Some(identity) if identity.is_identity() => TemplatePolicy::PassThrough,
            Some(identity) => TemplatePolicy::Rewrite(ReferenceRewriter::new(&identity)?),
            None => TemplatePolicy::Unconfigured,
        };

        Ok(Self {
            fetcher,
            store,
            templates,
        })
    }

    pub fn process_batch(&self, descriptors: &[ArtifactDescriptor]) -> Vec<ItemOutcome> {
        descriptors
            .iter()
            .map(|descriptor| self.process_descriptor(descriptor))
            .collect()
    }

    pub fn process_descriptor(&self, descriptor: &ArtifactDescriptor) -> ItemOutcome {
        let outcome = match self.relay_artifact(descriptor) {
            Ok(outcome) => outcome,
            Err(relay_error) => ProcessingOutcome::Failed(relay_error),
        };
        log_outcome(&descriptor.artifact_key, &outcome);

        ItemOutcome {
            artifact_key: descriptor.artifact_key.clone(),
            outcome,
        }
    }

    fn relay_artifact(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<ProcessingOutcome, RelayError> {
        if descriptor.artifact_key.trim().is_empty() {
            return Ok(ProcessingOutcome::Skipped(
                EMPTY_ARTIFACT_KEY_REASON.to_string(),
            ));
        }

        let bytes = self.fetcher.fetch(&descriptor.artifact_url)?;
        let mut payload = ArtifactPayload::new(descriptor.artifact_key.clone(), bytes);

        if is_template(&payload.destination_key, &payload.bytes) {
            payload.bytes = self.prepare_template(payload.bytes)?;
        }

        self.store
            .put_object(&payload.destination_key, &payload.bytes)?;
        Ok(ProcessingOutcome::Uploaded)
    }

    fn prepare_template(&self, bytes: Vec<u8>) -> Result<Vec<u8>, RelayError> {
        match &self.templates {
            TemplatePolicy::Rewrite(rewriter) => Ok(rewriter.rewrite(&bytes)),
            TemplatePolicy::PassThrough => Ok(bytes),
            TemplatePolicy::Unconfigured => Err(RelayError::MissingDistributorBucket),
        }
    }
}

fn log_outcome(artifact_key: &str, outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Uploaded => info!(artifact_key, "artifact_uploaded"),
        ProcessingOutcome::Skipped(reason) => warn!(artifact_key, reason = %reason, "artifact_skipped"),
        ProcessingOutcome::Failed(relay_error) => {
            error!(artifact_key, error = %relay_error, "artifact_failed")
        }
    }
}

/// Decode every SQS record body. Broken records are kept in place as errors
/// so that each record still yields exactly one outcome.
pub fn decode_sqs_records(
    event: &Value,
) -> Result<Vec<Result<ArtifactDescriptor, RelayError>>, EventDecodeError> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or(EventDecodeError::MissingRecords)?;

    Ok(records.iter().map(decode_record).collect())
}

fn decode_record(record: &Value) -> Result<ArtifactDescriptor, RelayError> {
    let body = record
        .get("body")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RelayError::InvalidMessage("SQS record body must be a string".to_string())
        })?;
    ArtifactDescriptor::from_message_body(body)
        .map_err(|decode_error| RelayError::InvalidMessage(decode_error.to_string()))
}

pub fn handle_sqs_event<F: ArtifactFetcher, S: ArtifactStore>(
    event: &Value,
    processor: &BatchProcessor<'_, F, S>,
) -> Result<BatchReport, EventDecodeError> {
    let decoded = decode_sqs_records(event)?;
    info!(records = decoded.len(), "batch_started");

    let outcomes: Vec<ItemOutcome> = decoded
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Ok(descriptor) => processor.process_descriptor(&descriptor),
            Err(relay_error) => {
                let artifact_key = format!("record[{index}]");
                let outcome = ProcessingOutcome::Failed(relay_error);
                log_outcome(&artifact_key, &outcome);
                ItemOutcome {
                    artifact_key,
                    outcome,
                }
            }
        })
        .collect();

    let report = BatchReport::summarize(&outcomes);
    info!(
        uploaded = report.uploaded,
        skipped = report.skipped,
        failed = report.failed,
        "batch_completed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::runtime::contract::{FetchError, OutcomeStatus, UploadError};

    const TEMPLATE: &str = "AWSTemplateFormatVersion: '2010-09-09'
Parameters:
  TemplatesBucket:
    Type: String
    Default: dist-bucket
Resources:
  CopyFunction:
    Properties:
      CodeUri: s3://dist-bucket/x
";

    struct ScriptedFetcher {
        responses: HashMap<String, Result<Vec<u8>, FetchError>>,
        requested: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<(&str, Result<Vec<u8>, FetchError>)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(url, response)| (url.to_string(), response))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().expect("poisoned mutex").clone()
        }
    }

    impl ArtifactFetcher for ScriptedFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requested
                .lock()
                .expect("poisoned mutex")
                .push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Network(format!("no route for {url}"))))
        }
    }

    fn served(bytes: &[u8]) -> Result<Vec<u8>, FetchError> {
        Ok(bytes.to_vec())
    }

    struct RecordingStore {
        writes: Mutex<HashMap<String, Vec<u8>>>,
        denied_key: Option<&'static str>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                writes: Mutex::new(HashMap::new()),
                denied_key: None,
            }
        }

        fn denying(key: &'static str) -> Self {
            Self {
                denied_key: Some(key),
                ..Self::new()
            }
        }

        fn body(&self, key: &str) -> Option<Vec<u8>> {
            self.writes
                .lock()
                .expect("poisoned mutex")
                .get(key)
                .cloned()
        }

        fn len(&self) -> usize {
            self.writes.lock().expect("poisoned mutex").len()
        }
    }

    impl ArtifactStore for RecordingStore {
        fn put_object(&self, key: &str, body: &[u8]) -> Result<(), UploadError> {
            if self.denied_key == Some(key) {
                return Err(UploadError::new(format!("AccessDenied for key: {key}")));
            }
            self.writes
                .lock()
                .expect("poisoned mutex")
                .insert(key.to_string(), body.to_vec());
            Ok(())
        }
    }

    fn config(distributor: Option<&str>) -> RelayConfig {
        RelayConfig::new("test-bucket", distributor.map(str::to_string))
            .expect("config should be valid")
    }

    fn statuses(outcomes: &[ItemOutcome]) -> Vec<OutcomeStatus> {
        outcomes.iter().map(|item| item.outcome.status()).collect()
    }

    #[test]
    fn plain_artifact_is_uploaded_unchanged() {
        let fetcher = ScriptedFetcher::new(vec![("https://signed/0", served(b"abcd"))]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(None), &fetcher, &store)
            .expect("processor should build");

        let outcomes =
            processor.process_batch(&[ArtifactDescriptor::new("item0", "https://signed/0")]);

        assert_eq!(outcomes[0].outcome, ProcessingOutcome::Uploaded);
        assert_eq!(store.body("item0"), Some(b"abcd".to_vec()));
    }

    #[test]
    fn yaml_template_is_rewritten_before_upload() {
        let fetcher =
            ScriptedFetcher::new(vec![("https://signed/0", served(TEMPLATE.as_bytes()))]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(Some("dist-bucket")), &fetcher, &store)
            .expect("processor should build");

        processor.process_batch(&[ArtifactDescriptor::new("packaged.yaml", "https://signed/0")]);

        let stored = String::from_utf8(store.body("packaged.yaml").expect("object stored"))
            .expect("template should stay utf-8");
        assert!(stored.contains("Default: test-bucket"));
        assert!(stored.contains("s3://test-bucket/x"));
        assert!(!stored.contains("dist-bucket"));
    }

    #[test]
    fn json_template_is_relayed_byte_identical() {
        let fetcher =
            ScriptedFetcher::new(vec![("https://signed/0", served(TEMPLATE.as_bytes()))]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(Some("dist-bucket")), &fetcher, &store)
            .expect("processor should build");

        processor.process_batch(&[ArtifactDescriptor::new("packaged.json", "https://signed/0")]);

        assert_eq!(store.body("packaged.json"), Some(TEMPLATE.as_bytes().to_vec()));
    }

    #[test]
    fn fetch_failure_does_not_stop_the_batch() {
        let fetcher = ScriptedFetcher::new(vec![
            ("https://signed/0", served(b"first")),
            (
                "https://signed/1",
                Err(FetchError::Status {
                    status: 403,
                    body: "AccessDenied".to_string(),
                }),
            ),
            ("https://signed/2", served(b"third")),
        ]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(None), &fetcher, &store)
            .expect("processor should build");

        let outcomes = processor.process_batch(&[
            ArtifactDescriptor::new("item0", "https://signed/0"),
            ArtifactDescriptor::new("item1", "https://signed/1"),
            ArtifactDescriptor::new("item2", "https://signed/2"),
        ]);

        assert_eq!(
            statuses(&outcomes),
            vec![
                OutcomeStatus::Uploaded,
                OutcomeStatus::Failed,
                OutcomeStatus::Uploaded
            ]
        );
        assert_eq!(store.len(), 2);
        assert_eq!(fetcher.requested().len(), 3);
    }

    #[test]
    fn upload_failure_is_isolated_to_its_item() {
        let fetcher = ScriptedFetcher::new(vec![
            ("https://signed/0", served(b"first")),
            ("https://signed/1", served(b"second")),
        ]);
        let store = RecordingStore::denying("item0");
        let processor = BatchProcessor::new(&config(None), &fetcher, &store)
            .expect("processor should build");

        let outcomes = processor.process_batch(&[
            ArtifactDescriptor::new("item0", "https://signed/0"),
            ArtifactDescriptor::new("item1", "https://signed/1"),
        ]);

        assert!(matches!(
            outcomes[0].outcome,
            ProcessingOutcome::Failed(RelayError::Upload(_))
        ));
        assert_eq!(outcomes[1].outcome, ProcessingOutcome::Uploaded);
        assert_eq!(store.body("item1"), Some(b"second".to_vec()));
    }

    #[test]
    fn template_without_distributor_bucket_fails_but_plain_files_relay() {
        let fetcher = ScriptedFetcher::new(vec![
            ("https://signed/0", served(TEMPLATE.as_bytes())),
            ("https://signed/1", served(b"abcd")),
        ]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(None), &fetcher, &store)
            .expect("processor should build");

        let outcomes = processor.process_batch(&[
            ArtifactDescriptor::new("packaged.yaml", "https://signed/0"),
            ArtifactDescriptor::new("item1", "https://signed/1"),
        ]);

        assert_eq!(
            outcomes[0].outcome,
            ProcessingOutcome::Failed(RelayError::MissingDistributorBucket)
        );
        assert_eq!(outcomes[1].outcome, ProcessingOutcome::Uploaded);
        assert_eq!(store.body("packaged.yaml"), None);
    }

    #[test]
    fn non_utf8_yaml_is_uploaded_byte_identical() {
        let mut payload = b"AWSTemplateFormatVersion: '2010-09-09'\nBucket: dist-bucket\n".to_vec();
        payload.extend_from_slice(&[0xff, 0xfe, 0x00]);
        let fetcher = ScriptedFetcher::new(vec![("https://signed/0", served(&payload))]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(Some("dist-bucket")), &fetcher, &store)
            .expect("processor should build");

        let outcomes =
            processor.process_batch(&[ArtifactDescriptor::new("packaged.yaml", "https://signed/0")]);

        assert_eq!(outcomes[0].outcome, ProcessingOutcome::Uploaded);
        assert_eq!(store.body("packaged.yaml"), Some(payload));
    }

    #[test]
    fn matching_bucket_names_skip_rewrite() {
        let fetcher =
            ScriptedFetcher::new(vec![("https://signed/0", served(TEMPLATE.as_bytes()))]);
        let store = RecordingStore::new();
        let config = RelayConfig::new("dist-bucket", Some("dist-bucket".to_string()))
            .expect("config should be valid");
        let processor =
            BatchProcessor::new(&config, &fetcher, &store).expect("processor should build");

        processor.process_batch(&[ArtifactDescriptor::new("packaged.yml", "https://signed/0")]);

        assert_eq!(store.body("packaged.yml"), Some(TEMPLATE.as_bytes().to_vec()));
    }

    #[test]
    fn empty_artifact_key_is_skipped_without_fetching() {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(None), &fetcher, &store)
            .expect("processor should build");

        let outcomes = processor.process_batch(&[ArtifactDescriptor::new(" ", "https://signed/0")]);

        assert_eq!(
            outcomes[0].outcome,
            ProcessingOutcome::Skipped(EMPTY_ARTIFACT_KEY_REASON.to_string())
        );
        assert!(fetcher.requested().is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn rejects_event_without_records() {
        let error = decode_sqs_records(&json!({"detail": {}})).expect_err("event should fail");
        assert_eq!(error, EventDecodeError::MissingRecords);
    }

    #[test]
    fn malformed_records_become_failed_outcomes() {
        let fetcher = ScriptedFetcher::new(vec![("https://signed/1", served(b"abcd"))]);
        let store = RecordingStore::new();
        let processor = BatchProcessor::new(&config(None), &fetcher, &store)
            .expect("processor should build");
        let event = json!({
            "Records": [
                {"eventSource": "aws:sqs", "body": 42},
                {
                    "eventSource": "aws:sqs",
                    "body": "{\"ArtifactKey\":\"item1\",\"ArtifactUrl\":\"https://signed/1\"}"
                },
                {"eventSource": "aws:sqs", "body": "{\"ArtifactKey\":\"item2\"}"}
            ]
        });

        let report = handle_sqs_event(&event, &processor).expect("event should decode");

        assert_eq!((report.uploaded, report.failed), (1, 2));
        assert_eq!(report.items[0].artifact_key, "record[0]");
        assert!(report.items[0]
            .detail
            .as_deref()
            .is_some_and(|detail| detail.contains("SQS record body must be a string")));
        assert_eq!(report.items[2].artifact_key, "record[2]");
        assert_eq!(store.body("item1"), Some(b"abcd".to_vec()));
    }
}
