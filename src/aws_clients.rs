use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use tracing;

// Builds the AWS SDK configuration for the given region and optional endpoint.
// Credentials come from the default provider chain (env vars, profiles, etc.).
pub async fn create_sdk_config(aws_region: &str, endpoint_url: Option<&str>) -> SdkConfig {
    tracing::info!(sdk_region = %aws_region, "Setting SDK region");

    let mut config_loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws_region.to_string()));

    if let Some(endpoint_url) = endpoint_url {
        tracing::info!("Using DynamoDB endpoint override: {}", endpoint_url);
        config_loader = config_loader.endpoint_url(endpoint_url);
    } else {
        tracing::info!("Using default AWS endpoints and credential resolution.");
    }

    config_loader.load().await
}

pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}
