use artifact_relay_lambda::adapters::cfn_response::HttpResponseSender;
use artifact_relay_lambda::adapters::s3::{load_aws_config, S3BucketContents};
use artifact_relay_lambda::handlers::clean_bucket::{respond_to_raw_event, CustomResourceResponse};
use artifact_relay_lambda::logging::init_structured_logging;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

struct RuntimeDependencies {
    contents: S3BucketContents,
    sender: HttpResponseSender,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<CustomResourceResponse, Error> {
    respond_to_raw_event(event.payload, &deps.contents, &deps.sender)
        .map_err(|error| Error::from(error.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_structured_logging();

    let aws_config = load_aws_config().await;
    let deps = RuntimeDependencies {
        contents: S3BucketContents::new(aws_sdk_s3::Client::new(&aws_config)),
        sender: HttpResponseSender::new().map_err(Error::from)?,
    };

    let deps = &deps;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, deps).await
    }))
    .await
}
