//! Smart Home Skill Lambda - bridges Alexa Smart Home directives to the
//! Wyze device API.

use std::sync::Arc;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use shared::{Config, Dispatcher, DynamoTokenStore, WyzeClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn handler(dispatcher: Arc<Dispatcher>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, _context) = event.into_parts();
    info!(directive = %payload, "Handling directive");

    let response = dispatcher.handle(&payload).await?;
    let response = serde_json::to_value(&response)?;
    info!(response = %response, "Sending response");

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::from_env().map_err(|e| format!("Missing configuration: {}", e))?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let dynamo = aws_sdk_dynamodb::Client::new(&aws_config);

    let store = DynamoTokenStore::new(dynamo, &config.tokens_table, &config.phone_id);
    let api = WyzeClient::new(&config);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(store), Arc::new(api)));

    run(service_fn(move |event| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { handler(dispatcher, event).await }
    }))
    .await
}
