use crate::{errors::RepoError, repositories::POST_ID_ATTR};
use anyhow::Context;
use aws_sdk_dynamodb::{
    Client as DynamoDbClient,
    error::SdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
};
use tracing;

/// Creates the posts table if it doesn't exist.
pub async fn ensure_posts_table(client: &DynamoDbClient, table_name: &str) -> Result<(), RepoError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(POST_ID_ATTR)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(POST_ID_ATTR)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created.", table_name);
            Ok(())
        }
        Err(SdkError::ServiceError(se)) if se.err().is_resource_in_use_exception() => {
            tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
            Ok(())
        }
        Err(e @ (SdkError::DispatchFailure(_) | SdkError::TimeoutError(_))) => Err(RepoError::Unavailable(
            anyhow::Error::new(e).context(format!("Startup: Could not reach DynamoDB to create table '{}'", table_name)),
        )),
        Err(e) => Err::<(), _>(e)
            .context(format!("Startup: Failed to create DynamoDB table '{}'", table_name))
            .map_err(RepoError::BackendError),
    }
}
