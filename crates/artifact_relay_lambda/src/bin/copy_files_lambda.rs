use artifact_relay_lambda::adapters::fetch::HttpArtifactFetcher;
use artifact_relay_lambda::adapters::s3::{load_aws_config, S3ArtifactStore};
use artifact_relay_lambda::handlers::copy_files::{handle_sqs_event, BatchProcessor};
use artifact_relay_lambda::logging::init_structured_logging;
use artifact_relay_lambda::runtime::config::RelayConfig;
use artifact_relay_lambda::runtime::contract::BatchReport;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(
    event: LambdaEvent<Value>,
    processor: &BatchProcessor<'_, HttpArtifactFetcher, S3ArtifactStore>,
) -> Result<BatchReport, Error> {
    handle_sqs_event(&event.payload, processor).map_err(|error| Error::from(error.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_structured_logging();

    let config = RelayConfig::from_env()?;
    let aws_config = load_aws_config().await;
    let store = S3ArtifactStore::new(
        config.artifacts_bucket(),
        aws_sdk_s3::Client::new(&aws_config),
    );
    let fetcher = HttpArtifactFetcher::new()?;
    let processor = BatchProcessor::new(&config, &fetcher, &store)?;

    tracing::info!(
        artifacts_bucket = store.bucket(),
        distributor_bucket = config.distributor_bucket().unwrap_or_default(),
        "copy_files_ready"
    );

    let processor = &processor;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, processor).await
    }))
    .await
}
